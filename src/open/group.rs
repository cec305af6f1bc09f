//! Datasets synthesized from multiscale array groups.
//!
//! Groups have no scene descriptor, so the sequence is derived from the
//! level-0 array: one setup per channel index, one timepoint per time index,
//! and a scale (plus translation) registration from the level-0 transform.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{ArrayLayout, ImageLoader, ResolveContext, Store};
use crate::error::{AttributeError, ResolveError};
use crate::io::FetchPool;
use crate::metadata::{read_group_attributes, AxisType, GroupAttributes, GroupLayout};
use crate::model::{
    AffineTransform3D, Channel, Dataset, SequenceDescription, SequenceShell, ViewRegistration,
    ViewSetup, VoxelSize,
};

/// Unit used when a group declares none.
const DEFAULT_UNIT: &str = "pixel";

/// Read the group at `store` and synthesize its dataset.
pub async fn open_group(
    context: &ResolveContext,
    store: Store,
    layout: GroupLayout,
    pool: Option<Arc<FetchPool>>,
) -> Result<Dataset, ResolveError> {
    let root = store.location();
    let attributes = read_group_attributes(context.transport.as_ref(), &root, layout).await?;
    dataset_from_group(attributes, store, pool)
}

/// Build a dataset whose loader addresses the arrays described by `attributes`.
pub fn dataset_from_group(
    attributes: GroupAttributes,
    store: Store,
    pool: Option<Arc<FetchPool>>,
) -> Result<Dataset, ResolveError> {
    let timepoints = axis_count(&attributes, AxisType::Time)?;
    let channels = axis_count(&attributes, AxisType::Channel)?;

    let spatial = attributes.spatial_axes();
    // x, y, z order; arrays store them slowest first
    let xyz: Vec<usize> = spatial.iter().rev().take(3).copied().collect();

    let mut size = [1u64; 3];
    let mut voxel = [1.0f64; 3];
    let mut offset = [0.0f64; 3];
    let level0 = attributes.levels.first();
    for (i, axis) in xyz.iter().enumerate() {
        size[i] = attributes.shape.get(*axis).copied().unwrap_or(1);
        if let Some(level) = level0 {
            voxel[i] = level.scale.get(*axis).copied().unwrap_or(1.0);
            offset[i] = level
                .translation
                .as_ref()
                .and_then(|t| t.get(*axis).copied())
                .unwrap_or(0.0);
        }
    }
    let unit = xyz
        .first()
        .and_then(|axis| attributes.axes[*axis].unit.clone())
        .unwrap_or_else(|| DEFAULT_UNIT.to_string());

    let mut shell = SequenceShell::with_timepoint_range(timepoints);
    for c in 0..channels {
        let name = attributes
            .channel_names
            .get(c as usize)
            .cloned()
            .flatten();

        let mut setup = ViewSetup::new(c);
        setup.name = name.clone();
        setup.channel = c;
        setup.size = Some(size);
        setup.voxel_size = Some(VoxelSize {
            unit: unit.clone(),
            dimensions: voxel,
        });
        shell.channels.insert(c, Channel { id: c, name });
        shell.insert_setup(setup);
    }

    let transform = AffineTransform3D::scale_translate(voxel, offset);
    let registrations: Vec<_> = (0..timepoints)
        .flat_map(|t| (0..channels).map(move |c| ViewRegistration::new(t, c, transform)))
        .collect();

    debug!(
        timepoints,
        channels,
        levels = attributes.levels.len(),
        "Synthesized dataset from group attributes"
    );

    let loader = ImageLoader::new(store, ArrayLayout::multiscale(attributes)).with_pool(pool);
    let sequence = SequenceDescription::new(shell, loader);
    Ok(Dataset::new(None, sequence, registrations)?)
}

fn axis_count(attributes: &GroupAttributes, axis_type: AxisType) -> Result<u32, AttributeError> {
    let length = attributes.axis_length(axis_type);
    u32::try_from(length)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            AttributeError::InvalidAxis(format!(
                "{:?} axis has unusable length {}",
                axis_type, length
            ))
        })
}
