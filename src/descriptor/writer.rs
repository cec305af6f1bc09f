use std::fmt::{self, Write as _};

use quick_xml::escape::escape;

use super::{SceneDescriptor, TextField};
use crate::error::DescriptorError;
use crate::model::{SequenceShell, ViewSetup};

const SPIM_DATA_VERSION: &str = "0.2";

/// Serialize a scene descriptor back to BDV XML.
///
/// Timepoints are written as a `range` style block, so their ids must form
/// a contiguous run; anything else is [`DescriptorError::Malformed`].
pub fn write_scene_descriptor(descriptor: &SceneDescriptor) -> Result<String, DescriptorError> {
    let (first, last) = timepoint_range(&descriptor.shell)?;
    let mut out = String::new();
    write_document(&mut out, descriptor, first, last)
        .map_err(|e| DescriptorError::malformed(format!("cannot format descriptor: {}", e)))?;
    Ok(out)
}

fn write_document(
    out: &mut String,
    descriptor: &SceneDescriptor,
    first: u32,
    last: u32,
) -> fmt::Result {
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    writeln!(out, "<SpimData version=\"{}\">", SPIM_DATA_VERSION)?;
    if let Some(base) = &descriptor.base_path {
        write_field(out, 1, "BasePath", base)?;
    }

    out.push_str("  <SequenceDescription>\n");
    if let Some(loader) = &descriptor.image_loader {
        write!(
            out,
            "    <ImageLoader format=\"{}\"",
            escape(loader.format.as_str())
        )?;
        if let Some(version) = &loader.version {
            write!(out, " version=\"{}\"", escape(version.as_str()))?;
        }
        out.push_str(">\n");
        for (name, field) in &loader.fields {
            write_field(out, 3, name, field)?;
        }
        out.push_str("    </ImageLoader>\n");
    }

    out.push_str("    <ViewSetups>\n");
    for setup in descriptor.shell.setups.values() {
        write_setup(out, setup)?;
    }
    let shell = &descriptor.shell;
    write_entities(
        out,
        "channel",
        "Channel",
        shell.channels.values().map(|c| (c.id, c.name.as_deref())),
    )?;
    write_entities(
        out,
        "angle",
        "Angle",
        shell.angles.values().map(|a| (a.id, a.name.as_deref())),
    )?;
    write_entities(
        out,
        "illumination",
        "Illumination",
        shell.illuminations.values().map(|i| (i.id, i.name.as_deref())),
    )?;
    out.push_str("    </ViewSetups>\n");

    writeln!(
        out,
        "    <Timepoints type=\"range\">\n      <first>{}</first>\n      <last>{}</last>\n    </Timepoints>",
        first, last
    )?;
    out.push_str("  </SequenceDescription>\n");

    out.push_str("  <ViewRegistrations>\n");
    for registration in descriptor.registrations.iter() {
        let affine = registration
            .transform
            .coefficients()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            out,
            "    <ViewRegistration timepoint=\"{}\" setup=\"{}\">\n      <ViewTransform type=\"affine\">\n        <affine>{}</affine>\n      </ViewTransform>\n    </ViewRegistration>",
            registration.view.timepoint, registration.view.setup, affine
        )?;
    }
    out.push_str("  </ViewRegistrations>\n");
    out.push_str("</SpimData>\n");
    Ok(())
}

fn timepoint_range(shell: &SequenceShell) -> Result<(u32, u32), DescriptorError> {
    let first = shell.timepoints.keys().next().copied();
    let last = shell.timepoints.keys().next_back().copied();
    match (first, last) {
        (Some(first), Some(last)) if (last - first) as usize + 1 == shell.timepoints.len() => {
            Ok((first, last))
        }
        (Some(_), Some(_)) => Err(DescriptorError::malformed(
            "timepoints are not a contiguous range",
        )),
        _ => Err(DescriptorError::malformed("sequence has no timepoints")),
    }
}

fn write_setup(out: &mut String, setup: &ViewSetup) -> fmt::Result {
    out.push_str("      <ViewSetup>\n");
    writeln!(out, "        <id>{}</id>", setup.id)?;
    if let Some(name) = &setup.name {
        writeln!(out, "        <name>{}</name>", escape(name.as_str()))?;
    }
    if let Some([x, y, z]) = setup.size {
        writeln!(out, "        <size>{} {} {}</size>", x, y, z)?;
    }
    if let Some(voxel) = &setup.voxel_size {
        let [x, y, z] = voxel.dimensions;
        writeln!(
            out,
            "        <voxelSize>\n          <unit>{}</unit>\n          <size>{} {} {}</size>\n        </voxelSize>",
            escape(voxel.unit.as_str()),
            x,
            y,
            z
        )?;
    }
    writeln!(
        out,
        "        <attributes>\n          <channel>{}</channel>\n          <angle>{}</angle>\n          <illumination>{}</illumination>\n        </attributes>",
        setup.channel, setup.angle, setup.illumination
    )?;
    out.push_str("      </ViewSetup>\n");
    Ok(())
}

fn write_entities<'a>(
    out: &mut String,
    block: &str,
    tag: &str,
    entities: impl Iterator<Item = (u32, Option<&'a str>)>,
) -> fmt::Result {
    let mut entities = entities.peekable();
    if entities.peek().is_none() {
        return Ok(());
    }
    writeln!(out, "      <Attributes name=\"{}\">", block)?;
    for (id, name) in entities {
        write!(out, "        <{}><id>{}</id>", tag, id)?;
        if let Some(name) = name {
            write!(out, "<name>{}</name>", escape(name))?;
        }
        writeln!(out, "</{}>", tag)?;
    }
    out.push_str("      </Attributes>\n");
    Ok(())
}

fn write_field(out: &mut String, depth: usize, name: &str, field: &TextField) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match &field.path_type {
        Some(path_type) => writeln!(
            out,
            "{}<{} type=\"{}\">{}</{}>",
            indent,
            name,
            escape(path_type.as_str()),
            escape(field.text.as_str()),
            name
        ),
        None => writeln!(
            out,
            "{}<{}>{}</{}>",
            indent,
            name,
            escape(field.text.as_str()),
            name
        ),
    }
}
