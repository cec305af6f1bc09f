//! Test utilities for integration tests.
//!
//! An in-memory transport that records reads, plus builders for BDV
//! descriptors and OME-Zarr group documents.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use spim_resolver::error::IoError;
use spim_resolver::io::{Location, Transport};
use spim_resolver::open::SpimDataOpener;

// =============================================================================
// Mock Transport with Request Tracking
// =============================================================================

/// In-memory transport keyed by the location's string form.
///
/// A location exists if a document is stored at it or beneath it, which is
/// how directory-like stores behave on both filesystems and object stores.
#[derive(Clone, Default)]
pub struct MockTransport {
    documents: HashMap<String, Bytes>,
    reads: Arc<Mutex<Vec<Location>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: &str, body: impl Into<String>) -> Self {
        self.documents
            .insert(location.to_string(), Bytes::from(body.into()));
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    /// Every location read so far, in order.
    pub fn reads(&self) -> Vec<Location> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        self.reads.lock().unwrap().push(location.clone());
        self.documents
            .get(&location.to_string())
            .cloned()
            .ok_or_else(|| IoError::NotFound(location.to_string()))
    }

    async fn exists(&self, location: &Location) -> Result<bool, IoError> {
        let key = location.to_string();
        let prefix = format!("{}/", key.trim_end_matches('/'));
        Ok(self
            .documents
            .keys()
            .any(|k| *k == key || k.starts_with(&prefix)))
    }
}

/// Opener with the default strategies over `transport`.
pub fn opener(transport: MockTransport) -> SpimDataOpener {
    SpimDataOpener::new(Arc::new(transport))
}

// =============================================================================
// BDV Descriptors
// =============================================================================

pub const IDENTITY: &str = "1 0 0 0 0 1 0 0 0 0 1 0";

pub const REMOTE_FIELDS: &str = r#"
      <ServiceEndpoint>https://s3.embl.de</ServiceEndpoint>
      <SigningRegion>us-west-2</SigningRegion>
      <BucketName>i2k-2020</BucketName>
      <Key>platy/raw.ome.zarr</Key>"#;

/// A `<ViewSetup>` with geometry and the given channel.
pub fn setup(id: u32, channel: u32) -> String {
    format!(
        r#"
      <ViewSetup>
        <id>{id}</id>
        <name>setup {id}</name>
        <size>512 512 100</size>
        <voxelSize><unit>µm</unit><size>0.5 0.5 2.0</size></voxelSize>
        <attributes><channel>{channel}</channel><angle>0</angle><illumination>0</illumination></attributes>
      </ViewSetup>"#,
        id = id,
        channel = channel
    )
}

/// An identity `<ViewRegistration>`.
pub fn registration(timepoint: u32, setup: u32) -> String {
    format!(
        r#"
    <ViewRegistration timepoint="{}" setup="{}">
      <ViewTransform type="affine"><affine>{}</affine></ViewTransform>
    </ViewRegistration>"#,
        timepoint, setup, IDENTITY
    )
}

/// Identity registrations for every (timepoint, setup) pair.
pub fn registrations(timepoints: impl Iterator<Item = u32>, setups: u32) -> String {
    timepoints
        .flat_map(|t| (0..setups).map(move |s| registration(t, s)))
        .collect()
}

/// A complete `SpimData` document.
pub fn descriptor(loader: &str, first: u32, last: u32, setups: &str, registrations: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SpimData version="0.2">
  <BasePath type="relative">.</BasePath>
  <SequenceDescription>
    {loader}
    <ViewSetups>{setups}
    </ViewSetups>
    <Timepoints type="range">
      <first>{first}</first>
      <last>{last}</last>
    </Timepoints>
  </SequenceDescription>
  <ViewRegistrations>{registrations}
  </ViewRegistrations>
</SpimData>"#,
        loader = loader,
        setups = setups,
        first = first,
        last = last,
        registrations = registrations
    )
}

/// The reference dataset: 3 timepoints, 2 setups of 512×512×100 voxels at
/// 0.5×0.5×2.0 µm, identity registrations for all 6 views.
pub fn reference_descriptor(loader: &str) -> String {
    let setups = format!("{}{}", setup(0, 0), setup(1, 1));
    descriptor(loader, 0, 2, &setups, &registrations(0..3, 2))
}

// =============================================================================
// OME-Zarr Groups
// =============================================================================

/// `.zattrs` of a `tczyx` group with two labelled channels and two levels.
pub const ZATTRS: &str = r#"{
    "multiscales": [{
        "version": "0.4",
        "axes": [
            {"name": "t", "type": "time"},
            {"name": "c", "type": "channel"},
            {"name": "z", "type": "space", "unit": "micrometer"},
            {"name": "y", "type": "space", "unit": "micrometer"},
            {"name": "x", "type": "space", "unit": "micrometer"}
        ],
        "datasets": [
            {"path": "s0", "coordinateTransformations": [
                {"type": "scale", "scale": [1.0, 1.0, 2.0, 0.5, 0.5]}
            ]},
            {"path": "s1", "coordinateTransformations": [
                {"type": "scale", "scale": [1.0, 1.0, 4.0, 1.0, 1.0]}
            ]}
        ]
    }],
    "omero": {"channels": [{"label": "dapi"}, {"label": "gfp"}]}
}"#;

/// `.zarray` of level `s0` of [`ZATTRS`].
pub const ZARRAY: &str = r#"{
    "shape": [3, 2, 100, 512, 512],
    "chunks": [1, 1, 32, 64, 64],
    "dtype": "<u2",
    "compressor": {"id": "blosc"},
    "zarr_format": 2
}"#;

/// Add the documents of an OME-Zarr group rooted at `root`.
pub fn with_ome_zarr(transport: MockTransport, root: &str) -> MockTransport {
    transport
        .with(&format!("{}/.zattrs", root), ZATTRS)
        .with(&format!("{}/s0/.zarray", root), ZARRAY)
}
