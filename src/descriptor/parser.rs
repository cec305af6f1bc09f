use std::collections::BTreeMap;
use std::str::FromStr;

use roxmltree::{Document, Node};
use tracing::{debug, warn};

use super::{LoaderElement, SceneDescriptor, TextField};
use crate::error::DescriptorError;
use crate::model::{
    AffineTransform3D, Angle, Channel, Illumination, SequenceShell, TimePoint, ViewRegistration,
    ViewRegistrations, ViewSetup, VoxelSize,
};

const ROOT: &str = "SpimData";
const RANGE_STYLE: &str = "range";

/// Largest timepoint range a descriptor may declare.
const MAX_TIMEPOINTS: u32 = 1 << 20;

/// Parse a BDV scene descriptor.
///
/// `<Timepoints type="range">` is the only supported timepoint style. Its
/// inclusive `first..=last` ids are re-indexed to start at 0, and
/// registration timepoint attributes are mapped the same way.
pub fn parse_scene_descriptor(bytes: &[u8]) -> Result<SceneDescriptor, DescriptorError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DescriptorError::malformed(format!("descriptor is not UTF-8: {}", e)))?;
    let doc = Document::parse(text)
        .map_err(|e| DescriptorError::malformed(format!("invalid XML: {}", e)))?;

    let root = doc.root_element();
    if root.tag_name().name() != ROOT {
        return Err(DescriptorError::malformed(format!(
            "root element is <{}>, expected <{}>",
            root.tag_name().name(),
            ROOT
        )));
    }

    let sequence = required_child(root, "SequenceDescription")?;
    let range = parse_timepoints(required_child(sequence, "Timepoints")?)?;

    let mut shell = SequenceShell {
        timepoints: (0..range.count())
            .map(|id| (id, TimePoint { id }))
            .collect(),
        ..SequenceShell::default()
    };

    let setups = required_child(sequence, "ViewSetups")?;
    parse_entities(setups, &mut shell);
    for node in children(setups, "ViewSetup") {
        let setup = parse_view_setup(node)?;
        if shell.setups.contains_key(&setup.id) {
            return Err(DescriptorError::malformed(format!(
                "view setup {} is declared more than once",
                setup.id
            )));
        }
        shell.insert_setup(setup);
    }

    let registrations = parse_registrations(required_child(root, "ViewRegistrations")?, &range)?;
    let registrations = ViewRegistrations::validated(&shell, registrations)?;

    let image_loader = child(sequence, "ImageLoader").map(parse_loader).transpose()?;
    let base_path = child(root, "BasePath").map(text_field);

    debug!(
        timepoints = shell.timepoints.len(),
        setups = shell.setups.len(),
        registrations = registrations.len(),
        loader = image_loader.as_ref().map(|l| l.format.as_str()),
        "Parsed scene descriptor"
    );

    Ok(SceneDescriptor {
        shell,
        registrations,
        image_loader,
        base_path,
    })
}

// =============================================================================
// Timepoints
// =============================================================================

struct TimepointRange {
    first: u32,
    last: u32,
}

impl TimepointRange {
    /// Never overflows: [`parse_timepoints`] bounds the range length.
    fn count(&self) -> u32 {
        self.last - self.first + 1
    }

    /// Map a declared timepoint id to its re-indexed id.
    fn index_of(&self, declared: u32) -> Result<u32, DescriptorError> {
        if declared < self.first || declared > self.last {
            return Err(DescriptorError::malformed(format!(
                "registration references unknown timepoint {} (range is {}..={})",
                declared, self.first, self.last
            )));
        }
        Ok(declared - self.first)
    }
}

fn parse_timepoints(node: Node) -> Result<TimepointRange, DescriptorError> {
    let style = node
        .attribute("type")
        .ok_or_else(|| DescriptorError::malformed("<Timepoints> has no type attribute"))?;
    if style != RANGE_STYLE {
        return Err(DescriptorError::UnsupportedTimepointStyle(style.to_string()));
    }

    let first: u32 = parse_number(required_text(node, "first")?, "Timepoints/first")?;
    let last: u32 = parse_number(required_text(node, "last")?, "Timepoints/last")?;
    if last < first {
        return Err(DescriptorError::malformed(format!(
            "timepoint range is empty: first={} last={}",
            first, last
        )));
    }
    if last - first >= MAX_TIMEPOINTS {
        return Err(DescriptorError::malformed(format!(
            "timepoint range {}..={} declares more than {} timepoints",
            first, last, MAX_TIMEPOINTS
        )));
    }
    Ok(TimepointRange { first, last })
}

// =============================================================================
// View setups
// =============================================================================

fn parse_view_setup(node: Node) -> Result<ViewSetup, DescriptorError> {
    let id: u32 = parse_number(required_text(node, "id")?, "ViewSetup/id")?;
    let mut setup = ViewSetup::new(id);
    setup.name = child_text(node, "name").map(str::to_string);

    setup.channel = match setup_attribute(node, "channel").map(str::parse::<u32>) {
        Some(Ok(channel)) => channel,
        Some(Err(_)) | None => {
            warn!(setup = id, "No channel specified, using channel 0");
            0
        }
    };
    setup.angle = setup_attribute(node, "angle")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    setup.illumination = setup_attribute(node, "illumination")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    setup.size = child_text(node, "size").and_then(parse_triple::<u64>);
    setup.voxel_size = child(node, "voxelSize").and_then(|voxel| {
        let dimensions = child_text(voxel, "size").and_then(parse_triple::<f64>)?;
        Some(VoxelSize {
            unit: child_text(voxel, "unit").unwrap_or_default().to_string(),
            dimensions,
        })
    });
    if !setup.has_geometry() {
        warn!(setup = id, "No pixel parameters specified");
    }

    Ok(setup)
}

/// Classification id given either directly or inside `<attributes>`.
fn setup_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child_text(node, name).or_else(|| child(node, "attributes").and_then(|a| child_text(a, name)))
}

/// Named entities from `<Attributes name="channel|angle|illumination">`.
fn parse_entities(setups: Node, shell: &mut SequenceShell) {
    for block in children(setups, "Attributes") {
        let entries = block.children().filter(Node::is_element).filter_map(|e| {
            let id = child_text(e, "id")?.parse::<u32>().ok()?;
            Some((id, child_text(e, "name").map(str::to_string)))
        });
        match block.attribute("name") {
            Some("channel") => {
                for (id, name) in entries {
                    shell.channels.entry(id).or_insert(Channel { id, name });
                }
            }
            Some("angle") => {
                for (id, name) in entries {
                    shell.angles.entry(id).or_insert(Angle { id, name });
                }
            }
            Some("illumination") => {
                for (id, name) in entries {
                    shell
                        .illuminations
                        .entry(id)
                        .or_insert(Illumination { id, name });
                }
            }
            other => debug!(name = ?other, "Skipping unknown attribute block"),
        }
    }
}

// =============================================================================
// Registrations
// =============================================================================

fn parse_registrations(
    node: Node,
    range: &TimepointRange,
) -> Result<Vec<ViewRegistration>, DescriptorError> {
    let mut registrations = Vec::new();
    for reg in children(node, "ViewRegistration") {
        let declared: u32 = parse_number(
            required_attribute(reg, "timepoint")?,
            "ViewRegistration/@timepoint",
        )?;
        let setup: u32 = parse_number(required_attribute(reg, "setup")?, "ViewRegistration/@setup")?;
        let timepoint = range.index_of(declared)?;

        let mut transforms = children(reg, "ViewTransform");
        let first = transforms.next().ok_or_else(|| {
            DescriptorError::malformed(format!(
                "registration for timepoint {} setup {} has no <ViewTransform>",
                declared, setup
            ))
        })?;
        if transforms.next().is_some() {
            debug!(timepoint, setup, "Keeping first of several view transforms");
        }

        let transform = parse_affine(required_text(first, "affine")?)?;
        registrations.push(ViewRegistration::new(timepoint, setup, transform));
    }
    Ok(registrations)
}

fn parse_affine(text: &str) -> Result<AffineTransform3D, DescriptorError> {
    let coefficients = text
        .split_whitespace()
        .map(|v| parse_number::<f64>(v, "affine"))
        .collect::<Result<Vec<_>, _>>()?;
    AffineTransform3D::from_slice(&coefficients).ok_or_else(|| {
        DescriptorError::malformed(format!(
            "affine has {} coefficients, expected 12",
            coefficients.len()
        ))
    })
}

// =============================================================================
// Image loader
// =============================================================================

fn parse_loader(node: Node) -> Result<LoaderElement, DescriptorError> {
    let format = required_attribute(node, "format")?;
    let mut loader = LoaderElement::new(format);
    loader.version = node.attribute("version").map(str::to_string);

    let mut fields = BTreeMap::new();
    for field in node.children().filter(Node::is_element) {
        fields
            .entry(field.tag_name().name().to_string())
            .or_insert_with(|| text_field(field));
    }
    loader.fields = fields;
    Ok(loader)
}

fn text_field(node: Node) -> TextField {
    TextField {
        text: node.text().unwrap_or_default().trim().to_string(),
        path_type: node.attribute("type").map(str::to_string),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn required_child<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> Result<Node<'a, 'input>, DescriptorError> {
    child(node, name).ok_or_else(|| {
        DescriptorError::malformed(format!(
            "<{}> is missing <{}>",
            node.tag_name().name(),
            name
        ))
    })
}

/// Trimmed, non-empty text of child `name`.
fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|c| c.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn required_text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, DescriptorError> {
    child_text(node, name).ok_or_else(|| {
        DescriptorError::malformed(format!(
            "<{}> is missing <{}>",
            node.tag_name().name(),
            name
        ))
    })
}

fn required_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, DescriptorError> {
    node.attribute(name).ok_or_else(|| {
        DescriptorError::malformed(format!(
            "<{}> is missing attribute {:?}",
            node.tag_name().name(),
            name
        ))
    })
}

fn parse_number<T: FromStr>(value: &str, what: &str) -> Result<T, DescriptorError> {
    value
        .trim()
        .parse()
        .map_err(|_| DescriptorError::malformed(format!("invalid {}: {:?}", what, value)))
}

/// Three whitespace-separated values, or `None`.
fn parse_triple<T: FromStr + Copy>(text: &str) -> Option<[T; 3]> {
    let values = text
        .split_whitespace()
        .map(|v| v.parse().ok())
        .collect::<Option<Vec<T>>>()?;
    values.as_slice().try_into().ok()
}
