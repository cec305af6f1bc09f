//! Pixel backends.
//!
//! An [`ImageLoader`] pairs a [`Store`] (where the arrays live) with an
//! [`ArrayLayout`] (how views and resolution levels map to array paths). It
//! never reads pixels itself; [`ImageLoader::array`] hands out an
//! [`ArrayHandle`] that an external chunk reader opens lazily.

mod resolver;
mod source;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::error::BackendError;
use crate::io::{FetchPool, Location, S3Address};
use crate::metadata::{AxisType, GroupAttributes};
use crate::model::ViewId;

pub use resolver::{
    loader_path, remote_address, resolve_backend, resolve_store, ResolveContext, BDV_HDF5, BDV_N5,
    BDV_N5_S3, BDV_OME_ZARR, BDV_OME_ZARR_S3, BUCKET_NAME, KEY, SERVICE_ENDPOINT, SIGNING_REGION,
};
pub use source::{ChunkSource, PooledChunkSource};

// =============================================================================
// Stores and layouts
// =============================================================================

/// Where the pixel arrays of a dataset live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Store {
    /// Directory-based chunked store on the local filesystem
    LocalArray { root: PathBuf },
    /// Key prefix in S3-compatible object storage
    RemoteObject { address: S3Address },
    /// Legacy single-file container
    MonolithicFile { file: PathBuf },
}

impl Store {
    pub fn identifier(&self) -> String {
        match self {
            Store::LocalArray { root } => root.display().to_string(),
            Store::RemoteObject { address } => address.identifier(),
            Store::MonolithicFile { file } => file.display().to_string(),
        }
    }

    /// Location readable by a [`Transport`](crate::io::Transport).
    ///
    /// Remote stores keep their signing region.
    pub fn location(&self) -> Location {
        match self {
            Store::LocalArray { root } => Location::Path(root.clone()),
            Store::RemoteObject { address } => Location::Object(address.clone()),
            Store::MonolithicFile { file } => Location::Path(file.clone()),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Store::RemoteObject { .. })
    }
}

/// How (timepoint, setup, level) keys map onto arrays in a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArrayLayout {
    /// `setup{s}/timepoint{t}/s{l}`
    BdvN5,
    /// `t{t:05}/s{s:02}/{l}/cells`
    BdvHdf5,
    /// One multiscale group; the setup id selects the channel index and the
    /// timepoint id the time index
    Multiscale { attributes: Box<GroupAttributes> },
}

impl ArrayLayout {
    pub fn multiscale(attributes: GroupAttributes) -> Self {
        ArrayLayout::Multiscale {
            attributes: Box::new(attributes),
        }
    }
}

// =============================================================================
// Array addressing
// =============================================================================

/// A view at one resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewLevel {
    pub view: ViewId,
    pub level: usize,
}

impl ViewLevel {
    pub fn new(timepoint: u32, setup: u32, level: usize) -> Self {
        Self {
            view: ViewId::new(timepoint, setup),
            level,
        }
    }
}

/// Address of one array inside a store.
#[derive(Debug, Clone)]
pub struct ArrayHandle {
    pub store: Store,
    /// Dataset path relative to the store root
    pub path: String,
    pub level: usize,
    /// Fixed indices on non-spatial axes as `(axis, index)`
    pub selection: Vec<(usize, u64)>,
    pub pool: Option<Arc<FetchPool>>,
}

impl ArrayHandle {
    /// Identifier used as the chunk cache namespace.
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.store.identifier().trim_end_matches('/'), self.path)
    }
}

// =============================================================================
// ImageLoader
// =============================================================================

/// The pixel backend of a sequence description.
#[derive(Debug, Clone, Serialize)]
pub struct ImageLoader {
    store: Store,
    layout: ArrayLayout,
    #[serde(skip)]
    pool: Option<Arc<FetchPool>>,
}

impl ImageLoader {
    pub fn new(store: Store, layout: ArrayLayout) -> Self {
        Self {
            store,
            layout,
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: Option<Arc<FetchPool>>) -> Self {
        self.pool = pool;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    pub fn pool(&self) -> Option<&Arc<FetchPool>> {
        self.pool.as_ref()
    }

    /// Number of resolution levels, when the layout declares them.
    pub fn level_count(&self) -> Option<usize> {
        match &self.layout {
            ArrayLayout::Multiscale { attributes } => Some(attributes.levels.len()),
            ArrayLayout::BdvN5 | ArrayLayout::BdvHdf5 => None,
        }
    }

    /// Address the array holding `key`.
    pub fn array(&self, key: ViewLevel) -> Result<ArrayHandle, BackendError> {
        let ViewId { timepoint, setup } = key.view;
        let (path, selection) = match &self.layout {
            ArrayLayout::BdvN5 => (
                format!("setup{}/timepoint{}/s{}", setup, timepoint, key.level),
                Vec::new(),
            ),
            ArrayLayout::BdvHdf5 => (
                format!("t{:05}/s{:02}/{}/cells", timepoint, setup, key.level),
                Vec::new(),
            ),
            ArrayLayout::Multiscale { attributes } => {
                let level = attributes.levels.get(key.level).ok_or(
                    BackendError::LevelOutOfRange {
                        level: key.level,
                        count: attributes.levels.len(),
                    },
                )?;
                let mut selection = Vec::new();
                for (axis_type, name, index) in [
                    (AxisType::Time, "time", timepoint),
                    (AxisType::Channel, "channel", setup),
                ] {
                    let Some(axis) = attributes.axis_index(axis_type) else {
                        continue;
                    };
                    let index = u64::from(index);
                    let length = attributes.axis_length(axis_type);
                    if index >= length {
                        return Err(BackendError::ViewOutOfRange {
                            axis: name,
                            index,
                            length,
                        });
                    }
                    selection.push((axis, index));
                }
                (level.path.clone(), selection)
            }
        };

        Ok(ArrayHandle {
            store: self.store.clone(),
            path,
            level: key.level,
            selection,
            pool: self.pool.clone(),
        })
    }
}
