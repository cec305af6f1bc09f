//! Array-group attribute documents.
//!
//! OME-Zarr and N5 datasets carry no scene descriptor; their structure lives
//! in JSON sidecars next to the arrays:
//!
//! - **OME-Zarr**: `.zattrs` (multiscales, axes, omero) at the group root and
//!   `.zarray` (shape, chunks, compressor) per resolution level
//! - **N5 multiscale** (OpenOrganelle): `attributes.json` at the group root
//!   (version, multiscales with per-level transforms) and per level
//!
//! [`read_group_attributes`] reads these into one [`GroupAttributes`] value.

mod n5;
mod ngff;

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AttributeError;
use crate::io::{Location, Transport};

// =============================================================================
// Axes
// =============================================================================

/// Semantic type of an array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisType {
    Space,
    Time,
    Channel,
}

impl AxisType {
    /// Parse a declared axis type.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "space" => Some(AxisType::Space),
            "time" => Some(AxisType::Time),
            "channel" => Some(AxisType::Channel),
            _ => None,
        }
    }

    /// Infer the type from a conventional axis name (`t`, `c`, `x`, ...).
    pub fn infer(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "t" | "time" => AxisType::Time,
            "c" | "channel" => AxisType::Channel,
            _ => AxisType::Space,
        }
    }
}

/// One array dimension: name, type and optional physical unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Axis {
    pub name: String,
    #[serde(rename = "type")]
    pub axis_type: AxisType,
    pub unit: Option<String>,
}

impl Axis {
    pub fn new(name: impl Into<String>, axis_type: AxisType, unit: Option<String>) -> Self {
        Self {
            name: name.into(),
            axis_type,
            unit,
        }
    }

    /// Axis with its type inferred from the name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let axis_type = AxisType::infer(&name);
        Self {
            name,
            axis_type,
            unit: None,
        }
    }
}

/// Fails with [`AttributeError::AxisMismatch`] unless there is one axis per dimension.
pub fn check_axes(axes: &[Axis], dimensions: usize) -> Result<(), AttributeError> {
    if axes.len() != dimensions {
        return Err(AttributeError::AxisMismatch {
            axes: axes.len(),
            dimensions,
        });
    }
    Ok(())
}

// =============================================================================
// Versions
// =============================================================================

/// A `major.minor.patch` schema version; missing parts default to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `"0.4"`, `"2.1.0"`, `"4"`. Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(part) => part.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(part) => part.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// =============================================================================
// Group attributes
// =============================================================================

/// Which attribute dialect a group uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLayout {
    /// OME-NGFF on Zarr v2 (`.zattrs` / `.zarray`)
    OmeZarr,
    /// N5 with OpenOrganelle-style `multiscales` (`attributes.json`)
    N5Multiscale,
}

/// One level of a resolution pyramid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionLevel {
    /// Dataset path relative to the group root
    pub path: String,
    /// Physical scale per axis
    pub scale: Vec<f64>,
    /// Physical offset per axis, when declared
    pub translation: Option<Vec<f64>>,
    /// Scale relative to level 0 per axis
    pub downsampling: Vec<f64>,
}

/// Structure of a multiscale array group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAttributes {
    pub version: SchemaVersion,
    /// Shape of the level-0 array, slowest-varying axis first
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub data_type: String,
    /// Compression codec identifier, `None` when uncompressed
    pub compression: Option<String>,
    pub axes: Vec<Axis>,
    /// Levels from highest to lowest resolution
    pub levels: Vec<ResolutionLevel>,
    /// Channel labels by channel index, when the group declares them
    pub channel_names: Vec<Option<String>>,
}

impl GroupAttributes {
    /// Index of the first axis of `axis_type`.
    pub fn axis_index(&self, axis_type: AxisType) -> Option<usize> {
        self.axes.iter().position(|a| a.axis_type == axis_type)
    }

    /// Length of the first axis of `axis_type`, 1 when there is none.
    pub fn axis_length(&self, axis_type: AxisType) -> u64 {
        self.axis_index(axis_type)
            .and_then(|i| self.shape.get(i).copied())
            .unwrap_or(1)
    }

    /// Indices of space axes in declaration order.
    pub fn spatial_axes(&self) -> Vec<usize> {
        self.axes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.axis_type == AxisType::Space)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Read the attributes of the multiscale group rooted at `root`.
pub async fn read_group_attributes(
    transport: &dyn Transport,
    root: &Location,
    layout: GroupLayout,
) -> Result<GroupAttributes, AttributeError> {
    match layout {
        GroupLayout::OmeZarr => ngff::read(transport, root).await,
        GroupLayout::N5Multiscale => n5::read(transport, root).await,
    }
}

// =============================================================================
// Helpers shared by the dialects
// =============================================================================

async fn read_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    location: &Location,
) -> Result<T, AttributeError> {
    let bytes: Bytes = transport.read(location).await?;
    serde_json::from_slice(&bytes).map_err(|e| AttributeError::Json {
        path: location.to_string(),
        message: e.to_string(),
    })
}

/// Default pyramid scale when a level declares none: 2^level on space axes.
fn default_scale(axes: &[Axis], level: usize) -> Vec<f64> {
    let factor = (1u64 << level.min(62)) as f64;
    axes.iter()
        .map(|a| match a.axis_type {
            AxisType::Space => factor,
            AxisType::Time | AxisType::Channel => 1.0,
        })
        .collect()
}

/// Fill in `downsampling` relative to the first level.
fn with_downsampling(mut levels: Vec<ResolutionLevel>) -> Vec<ResolutionLevel> {
    let base = match levels.first() {
        Some(level) => level.scale.clone(),
        None => return levels,
    };
    for level in &mut levels {
        level.downsampling = level
            .scale
            .iter()
            .zip(&base)
            .map(|(s, b)| if *b == 0.0 { 1.0 } else { s / b })
            .collect();
    }
    levels
}
