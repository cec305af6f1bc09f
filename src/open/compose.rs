//! Composition of a BDV scene descriptor with a separately stored OME-Zarr group.
//!
//! The descriptor contributes timepoints, setups and registrations; the group
//! contributes the image loader and any channels the descriptor lacks. Either
//! the whole composition succeeds or the open call fails with
//! [`OpenError::ComposeFailure`] naming the failed stage.

use std::sync::Arc;

use tracing::{debug, info};

use super::group::open_group;
use crate::backend::{remote_address, resolve_store, ArrayLayout, ResolveContext, Store};
use crate::descriptor::{parse_scene_descriptor, SceneDescriptor};
use crate::error::{BackendError, ComposeStage, DescriptorError, OpenError};
use crate::io::{FetchPool, Location};
use crate::metadata::{AxisType, GroupAttributes, GroupLayout};
use crate::model::{Dataset, SequenceDescription};

/// Path element naming the OME-Zarr group inside `<ImageLoader>`.
const OME_ZARR_PATH: &str = "ome.zarr";

/// Open a BDV descriptor at `location` whose pixels live in an OME-Zarr group.
///
/// With `remote` set the group is always addressed through the loader's
/// object-store fields and the dataset carries no base path. Otherwise the
/// loader's `<ome.zarr>` path is tried first and the object-store fields are
/// the fallback.
pub async fn open_composed(
    location: &Location,
    context: &ResolveContext,
    pool: Option<Arc<FetchPool>>,
    remote: bool,
) -> Result<Dataset, OpenError> {
    let bytes = context
        .transport
        .read(location)
        .await
        .map_err(|e| OpenError::compose(ComposeStage::Primary, e))?;
    let primary = parse_scene_descriptor(&bytes)
        .map_err(|e| OpenError::compose(ComposeStage::Primary, e))?;

    let base_path = if remote {
        None
    } else {
        super::strategies::base_location(&primary, location)
            .map_err(|e| OpenError::compose(ComposeStage::Primary, e))?
    };

    let loader = primary.image_loader.as_ref().ok_or_else(|| {
        OpenError::compose(
            ComposeStage::Secondary,
            BackendError::IncompleteBackendDescriptor("ImageLoader"),
        )
    })?;
    let store = if remote {
        remote_address(loader).map(|address| Store::RemoteObject { address })
    } else {
        resolve_store(loader, OME_ZARR_PATH, location, context).await
    }
    .map_err(|e| OpenError::compose(ComposeStage::Secondary, e))?;

    info!(store = %store.identifier(), "Opening image loader store");
    let secondary = open_group(context, store, GroupLayout::OmeZarr, pool)
        .await
        .map_err(|e| OpenError::compose(ComposeStage::Secondary, e))?;

    compose(primary, base_path, secondary)
}

/// Combine a parsed descriptor with the dataset opened from its pixel store.
///
/// The secondary loader replaces whatever loader the descriptor named.
/// Secondary channels are merged additively: a channel id already present in
/// the descriptor keeps the descriptor's entity. Every descriptor setup must
/// select an existing channel of the secondary group, and every timepoint an
/// existing time index.
pub fn compose(
    primary: SceneDescriptor,
    base_path: Option<Location>,
    secondary: Dataset,
) -> Result<Dataset, OpenError> {
    let (_, secondary_sequence, _) = secondary.into_parts();
    let (secondary_shell, loader) = secondary_sequence.into_parts();

    if let ArrayLayout::Multiscale { attributes } = loader.layout() {
        check_axis(attributes, AxisType::Channel, "setup", primary.shell.setups.keys())?;
        check_axis(attributes, AxisType::Time, "timepoint", primary.shell.timepoints.keys())?;
    }

    let SceneDescriptor {
        mut shell,
        registrations,
        ..
    } = primary;
    let before = shell.channels.len();
    shell.merge_channels(secondary_shell.channels);
    debug!(
        added = shell.channels.len() - before,
        "Merged channels from image loader store"
    );

    let sequence = SequenceDescription::new(shell, loader);
    Ok(Dataset::from_validated(base_path, sequence, registrations))
}

/// Fail the merge when an id indexes past the end of the store's
/// `axis_type` axis. Stores without that axis accept any id.
fn check_axis<'a>(
    attributes: &GroupAttributes,
    axis_type: AxisType,
    kind: &str,
    ids: impl IntoIterator<Item = &'a u32>,
) -> Result<(), OpenError> {
    if attributes.axis_index(axis_type).is_none() {
        return Ok(());
    }
    let length = attributes.axis_length(axis_type);
    match ids.into_iter().find(|id| u64::from(**id) >= length) {
        Some(id) => Err(OpenError::compose(
            ComposeStage::Merge,
            DescriptorError::malformed(format!(
                "{} {} is past the end of a store axis of length {}",
                kind, id, length
            )),
        )),
        None => Ok(()),
    }
}
