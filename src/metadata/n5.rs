//! N5 multiscale attributes as published by OpenOrganelle.
//!
//! N5 stores dimensions fastest-axis first; they are reversed here so that
//! shapes line up with the C-ordered `axes` of the multiscale transform.

use serde::Deserialize;
use tracing::debug;

use super::{
    check_axes, default_scale, read_json, with_downsampling, Axis, AxisType, GroupAttributes,
    ResolutionLevel, SchemaVersion,
};
use crate::error::AttributeError;
use crate::io::{Location, Transport};

const ATTRIBUTES: &str = "attributes.json";
const SCHEMA: &str = "N5";

/// N5 major versions with a known attribute layout.
const SUPPORTED_MAJORS: std::ops::RangeInclusive<u32> = 1..=4;

#[derive(Debug, Deserialize)]
struct N5GroupAttributes {
    #[serde(rename = "n5")]
    n5_version: Option<String>,
    #[serde(default)]
    multiscales: Vec<N5Multiscale>,
}

#[derive(Debug, Deserialize)]
struct N5Multiscale {
    #[serde(default)]
    datasets: Vec<N5Dataset>,
}

#[derive(Debug, Deserialize)]
struct N5Dataset {
    path: String,
    transform: Option<N5Transform>,
}

#[derive(Debug, Deserialize)]
struct N5Transform {
    #[serde(default)]
    axes: Vec<String>,
    #[serde(default)]
    scale: Vec<f64>,
    #[serde(default)]
    translate: Vec<f64>,
    #[serde(default)]
    units: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct N5ArrayAttributes {
    dimensions: Vec<u64>,
    block_size: Vec<u64>,
    data_type: String,
    compression: Option<N5Compression>,
    /// Pre-1.0 layouts name the codec directly
    compression_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct N5Compression {
    #[serde(rename = "type")]
    kind: String,
}

pub(super) async fn read(
    transport: &dyn Transport,
    root: &Location,
) -> Result<GroupAttributes, AttributeError> {
    let attrs: N5GroupAttributes = read_json(transport, &root.join(ATTRIBUTES)?).await?;

    let declared = attrs
        .n5_version
        .as_deref()
        .ok_or_else(|| AttributeError::MissingAttributes("n5 version".to_string()))?;
    let version = SchemaVersion::parse(declared)
        .filter(|v| SUPPORTED_MAJORS.contains(&v.major))
        .ok_or_else(|| AttributeError::UnsupportedVersion {
            schema: SCHEMA,
            version: declared.to_string(),
        })?;

    let multiscale = attrs
        .multiscales
        .into_iter()
        .next()
        .ok_or_else(|| AttributeError::MissingAttributes("multiscales".to_string()))?;
    let first = multiscale
        .datasets
        .first()
        .ok_or_else(|| AttributeError::MissingAttributes("multiscales datasets".to_string()))?;
    let transform = first
        .transform
        .as_ref()
        .filter(|t| !t.axes.is_empty())
        .ok_or_else(|| AttributeError::MissingAttributes("transform axes".to_string()))?;

    let axes: Vec<Axis> = transform
        .axes
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Axis::new(
                name.clone(),
                AxisType::infer(name),
                transform.units.get(i).cloned(),
            )
        })
        .collect();

    let array_location = root.join(&format!("{}/{}", first.path.trim_matches('/'), ATTRIBUTES))?;
    let array: N5ArrayAttributes = read_json(transport, &array_location).await?;

    let shape: Vec<u64> = array.dimensions.iter().rev().copied().collect();
    let chunk_shape: Vec<u64> = array.block_size.iter().rev().copied().collect();
    check_axes(&axes, shape.len())?;

    let mut levels = Vec::with_capacity(multiscale.datasets.len());
    for (index, dataset) in multiscale.datasets.iter().enumerate() {
        let (scale, translation) = match &dataset.transform {
            Some(t) if !t.scale.is_empty() => (
                t.scale.clone(),
                Some(t.translate.clone()).filter(|v| !v.is_empty()),
            ),
            _ => (default_scale(&axes, index), None),
        };
        if scale.len() != axes.len() {
            return Err(AttributeError::AxisMismatch {
                axes: axes.len(),
                dimensions: scale.len(),
            });
        }
        levels.push(ResolutionLevel {
            path: dataset.path.trim_matches('/').to_string(),
            scale,
            translation,
            downsampling: Vec::new(),
        });
    }

    let compression = array
        .compression
        .map(|c| c.kind)
        .or(array.compression_type)
        .filter(|kind| kind != "raw");

    debug!(
        root = %root,
        version = %version,
        levels = levels.len(),
        "Read N5 group attributes"
    );

    Ok(GroupAttributes {
        version,
        shape,
        chunk_shape,
        data_type: array.data_type,
        compression,
        axes,
        levels: with_downsampling(levels),
        channel_names: Vec::new(),
    })
}
