//! OME-NGFF (OME-Zarr) multiscale attributes.
//!
//! Version drift handled here:
//!
//! - 0.1 / 0.2: no `axes`; arrays are always 5D `t c z y x`
//! - 0.3: `axes` as a list of names
//! - 0.4: `axes` as objects with `type`/`unit`, per-level `coordinateTransformations`

use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    check_axes, default_scale, read_json, with_downsampling, Axis, AxisType, GroupAttributes,
    ResolutionLevel, SchemaVersion,
};
use crate::error::AttributeError;
use crate::io::{Location, Transport};

const ZATTRS: &str = ".zattrs";
const ZARRAY: &str = ".zarray";
const SCHEMA: &str = "OME-NGFF";

/// Only NGFF major version 0 has a parser.
const SUPPORTED_MAJOR: u32 = 0;

/// Newest minor version with known rules; newer minors are read by these rules.
const LATEST_KNOWN_MINOR: u32 = 4;

/// Axes implied by versions that predate the `axes` field.
const IMPLICIT_AXES: [&str; 5] = ["t", "c", "z", "y", "x"];

#[derive(Debug, Deserialize)]
struct ZarrGroupAttributes {
    #[serde(default)]
    multiscales: Vec<Multiscale>,
    omero: Option<Omero>,
}

#[derive(Debug, Deserialize)]
struct Multiscale {
    version: Option<String>,
    axes: Option<Vec<AxisEntry>>,
    #[serde(default)]
    datasets: Vec<MultiscaleDataset>,
    #[serde(rename = "coordinateTransformations", default)]
    coordinate_transformations: Vec<CoordinateTransformation>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AxisEntry {
    Name(String),
    Full {
        name: String,
        #[serde(rename = "type")]
        axis_type: Option<String>,
        unit: Option<String>,
    },
}

impl AxisEntry {
    fn into_axis(self) -> Result<Axis, AttributeError> {
        match self {
            AxisEntry::Name(name) => Ok(Axis::named(name)),
            AxisEntry::Full {
                name,
                axis_type: None,
                unit,
            } => {
                let axis_type = AxisType::infer(&name);
                Ok(Axis::new(name, axis_type, unit))
            }
            AxisEntry::Full {
                name,
                axis_type: Some(declared),
                unit,
            } => {
                let axis_type = AxisType::parse(&declared).ok_or_else(|| {
                    AttributeError::InvalidAxis(format!(
                        "axis {:?} has unknown type {:?}",
                        name, declared
                    ))
                })?;
                Ok(Axis::new(name, axis_type, unit))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MultiscaleDataset {
    path: String,
    #[serde(rename = "coordinateTransformations", default)]
    coordinate_transformations: Vec<CoordinateTransformation>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum CoordinateTransformation {
    Scale {
        scale: Vec<f64>,
    },
    Translation {
        translation: Vec<f64>,
    },
    #[serde(other)]
    Other,
}

fn find_scale(transforms: &[CoordinateTransformation]) -> Option<&[f64]> {
    transforms.iter().find_map(|t| match t {
        CoordinateTransformation::Scale { scale } => Some(scale.as_slice()),
        _ => None,
    })
}

fn find_translation(transforms: &[CoordinateTransformation]) -> Option<&[f64]> {
    transforms.iter().find_map(|t| match t {
        CoordinateTransformation::Translation { translation } => Some(translation.as_slice()),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct Omero {
    #[serde(default)]
    channels: Vec<OmeroChannel>,
}

#[derive(Debug, Deserialize)]
struct OmeroChannel {
    label: Option<String>,
}

/// Zarr v2 array metadata (`.zarray`).
#[derive(Debug, Deserialize)]
struct ZarrArrayMetadata {
    shape: Vec<u64>,
    chunks: Vec<u64>,
    dtype: String,
    compressor: Option<ZarrCompressor>,
}

#[derive(Debug, Deserialize)]
struct ZarrCompressor {
    id: String,
}

pub(super) async fn read(
    transport: &dyn Transport,
    root: &Location,
) -> Result<GroupAttributes, AttributeError> {
    let attrs: ZarrGroupAttributes = read_json(transport, &root.join(ZATTRS)?).await?;

    let multiscale = attrs
        .multiscales
        .into_iter()
        .next()
        .ok_or_else(|| AttributeError::MissingAttributes("multiscales".to_string()))?;

    let declared = multiscale
        .version
        .as_deref()
        .ok_or_else(|| AttributeError::MissingAttributes("multiscales version".to_string()))?;
    let version = SchemaVersion::parse(declared).ok_or_else(|| AttributeError::UnsupportedVersion {
        schema: SCHEMA,
        version: declared.to_string(),
    })?;
    if version.major != SUPPORTED_MAJOR {
        return Err(AttributeError::UnsupportedVersion {
            schema: SCHEMA,
            version: declared.to_string(),
        });
    }
    let minor = if version.minor > LATEST_KNOWN_MINOR {
        warn!(
            version = %version,
            "Unknown OME-NGFF minor version, reading as 0.{}", LATEST_KNOWN_MINOR
        );
        LATEST_KNOWN_MINOR
    } else {
        version.minor
    };

    let axes = match multiscale.axes {
        Some(entries) => entries
            .into_iter()
            .map(AxisEntry::into_axis)
            .collect::<Result<Vec<_>, _>>()?,
        None if minor <= 2 => IMPLICIT_AXES.iter().map(|n| Axis::named(*n)).collect(),
        None => {
            return Err(AttributeError::MissingAttributes(
                "multiscales axes".to_string(),
            ))
        }
    };

    let first = multiscale
        .datasets
        .first()
        .ok_or_else(|| AttributeError::MissingAttributes("multiscales datasets".to_string()))?;
    let array_location = root.join(&format!("{}/{}", first.path.trim_matches('/'), ZARRAY))?;
    let array: ZarrArrayMetadata = read_json(transport, &array_location).await?;

    check_axes(&axes, array.shape.len())?;

    let global_scale = find_scale(&multiscale.coordinate_transformations);
    let mut levels = Vec::with_capacity(multiscale.datasets.len());
    for (index, dataset) in multiscale.datasets.iter().enumerate() {
        let mut scale = match find_scale(&dataset.coordinate_transformations) {
            Some(scale) => scale.to_vec(),
            None => default_scale(&axes, index),
        };
        if scale.len() != axes.len() {
            return Err(AttributeError::AxisMismatch {
                axes: axes.len(),
                dimensions: scale.len(),
            });
        }
        if let Some(global) = global_scale.filter(|g| g.len() == scale.len()) {
            for (s, g) in scale.iter_mut().zip(global) {
                *s *= g;
            }
        }

        levels.push(ResolutionLevel {
            path: dataset.path.trim_matches('/').to_string(),
            scale,
            translation: find_translation(&dataset.coordinate_transformations)
                .map(<[f64]>::to_vec),
            downsampling: Vec::new(),
        });
    }

    let channel_names = attrs
        .omero
        .map(|o| o.channels.into_iter().map(|c| c.label).collect())
        .unwrap_or_default();

    debug!(
        root = %root,
        version = %version,
        levels = levels.len(),
        "Read OME-Zarr group attributes"
    );

    Ok(GroupAttributes {
        version,
        shape: array.shape,
        chunk_shape: array.chunks,
        data_type: array.dtype,
        compression: array.compressor.map(|c| c.id),
        axes,
        levels: with_downsampling(levels),
        channel_names,
    })
}
