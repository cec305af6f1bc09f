//! Format dispatch.
//!
//! [`SpimDataOpener`] maps a caller-declared [`ImageDataFormat`] to the
//! [`DatasetOpener`] strategy that knows how to open it. The format is never
//! sniffed from the location: a BDV descriptor and an OME-Zarr group can live
//! at indistinguishable URLs.

mod compose;
mod group;
mod strategies;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::ResolveContext;
use crate::config::DEFAULT_REGION;
use crate::error::OpenError;
use crate::io::{FetchPool, Location, Transport};
use crate::model::Dataset;

pub use compose::{compose, open_composed};
pub use group::{dataset_from_group, open_group};
pub use strategies::{ComposedOpener, DescriptorOpener, GroupOpener};

// =============================================================================
// Formats
// =============================================================================

/// Declared storage format of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
pub enum ImageDataFormat {
    /// Imaris `.ims` file
    #[value(name = "imaris")]
    #[serde(rename = "imaris")]
    Imaris,
    /// BDV descriptor with a single-file HDF5 container
    #[value(name = "bdv.h5")]
    #[serde(rename = "bdv.h5")]
    BdvHdf5,
    /// BDV descriptor with an N5 container
    #[value(name = "bdv.n5")]
    #[serde(rename = "bdv.n5")]
    BdvN5,
    /// BDV descriptor with an N5 container in object storage
    #[value(name = "bdv.n5.s3")]
    #[serde(rename = "bdv.n5.s3")]
    BdvN5S3,
    /// OME-Zarr group on the local filesystem
    #[value(name = "ome.zarr")]
    #[serde(rename = "ome.zarr")]
    OmeZarr,
    /// OME-Zarr group in object storage
    #[value(name = "ome.zarr.s3")]
    #[serde(rename = "ome.zarr.s3")]
    OmeZarrS3,
    /// BDV descriptor whose pixels live in an OME-Zarr group
    #[value(name = "bdv.ome.zarr")]
    #[serde(rename = "bdv.ome.zarr")]
    BdvOmeZarr,
    /// BDV descriptor whose pixels live in an OME-Zarr group in object storage
    #[value(name = "bdv.ome.zarr.s3")]
    #[serde(rename = "bdv.ome.zarr.s3")]
    BdvOmeZarrS3,
    /// OpenOrganelle N5 multiscale group in object storage
    #[value(name = "openorganelle.s3")]
    #[serde(rename = "openorganelle.s3")]
    OpenOrganelleS3,
}

impl ImageDataFormat {
    pub const ALL: [ImageDataFormat; 9] = [
        ImageDataFormat::Imaris,
        ImageDataFormat::BdvHdf5,
        ImageDataFormat::BdvN5,
        ImageDataFormat::BdvN5S3,
        ImageDataFormat::OmeZarr,
        ImageDataFormat::OmeZarrS3,
        ImageDataFormat::BdvOmeZarr,
        ImageDataFormat::BdvOmeZarrS3,
        ImageDataFormat::OpenOrganelleS3,
    ];

    /// Canonical name, e.g. `bdv.n5.s3`.
    pub fn name(&self) -> &'static str {
        match self {
            ImageDataFormat::Imaris => "imaris",
            ImageDataFormat::BdvHdf5 => "bdv.h5",
            ImageDataFormat::BdvN5 => "bdv.n5",
            ImageDataFormat::BdvN5S3 => "bdv.n5.s3",
            ImageDataFormat::OmeZarr => "ome.zarr",
            ImageDataFormat::OmeZarrS3 => "ome.zarr.s3",
            ImageDataFormat::BdvOmeZarr => "bdv.ome.zarr",
            ImageDataFormat::BdvOmeZarrS3 => "bdv.ome.zarr.s3",
            ImageDataFormat::OpenOrganelleS3 => "openorganelle.s3",
        }
    }
}

impl fmt::Display for ImageDataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// One way of turning a location into a [`Dataset`].
#[async_trait]
pub trait DatasetOpener: Send + Sync {
    /// Whether loaders built by this strategy can draw on a shared [`FetchPool`].
    fn supports_shared_pool(&self) -> bool;

    /// Open the dataset at `location`.
    ///
    /// `pool` is only passed when [`supports_shared_pool`](Self::supports_shared_pool)
    /// returns `true`.
    async fn open(
        &self,
        location: &Location,
        context: &ResolveContext,
        pool: Option<Arc<FetchPool>>,
    ) -> Result<Dataset, OpenError>;
}

// =============================================================================
// SpimDataOpener
// =============================================================================

/// Opens datasets of any registered format into one [`Dataset`] model.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use spim_resolver::io::{IoRouter, Location, S3Transport};
/// use spim_resolver::open::{ImageDataFormat, SpimDataOpener};
///
/// let opener = SpimDataOpener::new(Arc::new(IoRouter::new(S3Transport::new("us-east-1"))));
/// let location = Location::parse("https://s3.embl.de/i2k-2020/platy/raw.xml")?;
/// let dataset = opener.open(&location, ImageDataFormat::BdvN5S3, None).await?;
/// println!("{} setups", dataset.sequence().setups().len());
/// ```
pub struct SpimDataOpener {
    context: ResolveContext,
    strategies: HashMap<ImageDataFormat, Arc<dyn DatasetOpener>>,
}

impl SpimDataOpener {
    /// Create an opener with the default strategy for every supported format.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let mut opener = Self::empty(transport);
        opener.register(ImageDataFormat::BdvHdf5, Arc::new(DescriptorOpener::new(false)));
        opener.register(ImageDataFormat::BdvN5, Arc::new(DescriptorOpener::new(true)));
        opener.register(ImageDataFormat::BdvN5S3, Arc::new(DescriptorOpener::new(true)));
        opener.register(ImageDataFormat::OmeZarr, Arc::new(GroupOpener::ome_zarr(false)));
        opener.register(ImageDataFormat::OmeZarrS3, Arc::new(GroupOpener::ome_zarr(true)));
        opener.register(
            ImageDataFormat::OpenOrganelleS3,
            Arc::new(GroupOpener::open_organelle()),
        );
        opener.register(ImageDataFormat::BdvOmeZarr, Arc::new(ComposedOpener::new(false)));
        opener.register(ImageDataFormat::BdvOmeZarrS3, Arc::new(ComposedOpener::new(true)));
        opener
    }

    /// Create an opener with no strategies registered.
    pub fn empty(transport: Arc<dyn Transport>) -> Self {
        Self {
            context: ResolveContext::new(transport, DEFAULT_REGION),
            strategies: HashMap::new(),
        }
    }

    /// Region used for object-store URLs that carry none.
    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.context.default_region = region.into();
        self
    }

    /// Register `strategy` for `format`, returning the strategy it replaces.
    pub fn register(
        &mut self,
        format: ImageDataFormat,
        strategy: Arc<dyn DatasetOpener>,
    ) -> Option<Arc<dyn DatasetOpener>> {
        self.strategies.insert(format, strategy)
    }

    pub fn supports(&self, format: ImageDataFormat) -> bool {
        self.strategies.contains_key(&format)
    }

    /// Whether `format` can use a shared [`FetchPool`].
    pub fn supports_shared_pool(&self, format: ImageDataFormat) -> bool {
        self.strategies
            .get(&format)
            .map(|s| s.supports_shared_pool())
            .unwrap_or(false)
    }

    /// Open the dataset at `location`, declared to be stored as `format`.
    ///
    /// A `pool` offered to a format without pooled loaders is dropped with a
    /// warning and the dataset is opened with private resources.
    pub async fn open(
        &self,
        location: &Location,
        format: ImageDataFormat,
        pool: Option<Arc<FetchPool>>,
    ) -> Result<Dataset, OpenError> {
        let strategy = self
            .strategies
            .get(&format)
            .ok_or(OpenError::UnsupportedFormat(format))?;

        let pool = match pool {
            Some(_) if !strategy.supports_shared_pool() => {
                warn!(
                    format = %format,
                    "Shared pools are not supported for this format, opening with own resources"
                );
                None
            }
            pool => pool,
        };

        info!(location = %location, format = %format, "Opening dataset");
        strategy.open(location, &self.context, pool).await
    }
}
