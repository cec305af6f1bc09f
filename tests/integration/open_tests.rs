//! Format dispatch integration tests.
//!
//! Tests verify:
//! - BDV descriptors resolve local, remote and single-file backends
//! - A missing local store falls through to the remote fields
//! - OME-Zarr and OpenOrganelle groups synthesize a dataset
//! - Shared pools reach pooled formats and are dropped for the others
//! - Unregistered formats and missing documents fail cleanly

use std::path::PathBuf;
use std::sync::Arc;

use spim_resolver::backend::{ArrayLayout, Store, ViewLevel};
use spim_resolver::error::{BackendError, IoError, OpenError, ResolveError};
use spim_resolver::io::{FetchPool, LocalTransport, Location};
use spim_resolver::model::{Channel, ViewId};
use spim_resolver::open::{ImageDataFormat, SpimDataOpener};

use super::test_utils::{opener, reference_descriptor, with_ome_zarr, MockTransport, REMOTE_FIELDS};

const N5_ROOT_ATTRS: &str = r#"{
    "n5": "2.3.0",
    "multiscales": [{
        "datasets": [
            {"path": "s0", "transform": {
                "axes": ["z", "y", "x"],
                "scale": [8.0, 4.0, 4.0],
                "translate": [0.0, 0.0, 0.0],
                "units": ["nm", "nm", "nm"]
            }}
        ]
    }]
}"#;

const N5_LEVEL_ATTRS: &str = r#"{
    "dimensions": [1024, 512, 256],
    "blockSize": [64, 64, 64],
    "dataType": "uint8",
    "compression": {"type": "gzip"}
}"#;

fn n5_loader(extra: &str) -> String {
    format!(
        r#"<ImageLoader format="bdv.n5" version="1.0">
      <n5 type="relative">dataset.n5</n5>{}
    </ImageLoader>"#,
        extra
    )
}

// =============================================================================
// BDV Descriptors
// =============================================================================

#[tokio::test]
async fn test_local_n5_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let xml_path = dir.path().join("dataset.xml");
    std::fs::write(&xml_path, reference_descriptor(&n5_loader(""))).unwrap();
    std::fs::create_dir(dir.path().join("dataset.n5")).unwrap();

    let opener = SpimDataOpener::new(Arc::new(LocalTransport));
    let dataset = opener
        .open(&Location::Path(xml_path), ImageDataFormat::BdvN5, None)
        .await
        .unwrap();

    assert_eq!(
        dataset.base_path(),
        Some(&Location::Path(dir.path().to_path_buf()))
    );
    assert_eq!(
        dataset.image_loader().store(),
        &Store::LocalArray {
            root: dir.path().join("dataset.n5")
        }
    );

    let array = dataset.image_loader().array(ViewLevel::new(2, 1, 0)).unwrap();
    assert_eq!(array.path, "setup1/timepoint2/s0");
}

#[tokio::test]
async fn test_missing_local_store_falls_through_to_remote() {
    let dir = tempfile::tempdir().unwrap();
    let xml_path = dir.path().join("dataset.xml");
    std::fs::write(&xml_path, reference_descriptor(&n5_loader(REMOTE_FIELDS))).unwrap();

    let opener = SpimDataOpener::new(Arc::new(LocalTransport));
    let dataset = opener
        .open(&Location::Path(xml_path), ImageDataFormat::BdvN5, None)
        .await
        .unwrap();

    match dataset.image_loader().store() {
        Store::RemoteObject { address } => {
            assert_eq!(address.endpoint.as_deref(), Some("https://s3.embl.de"));
            assert_eq!(address.region, "us-west-2");
            assert_eq!(address.bucket, "i2k-2020");
            assert_eq!(address.key, "platy/raw.ome.zarr");
        }
        other => panic!("expected a remote store, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_local_store_without_remote_fields() {
    let dir = tempfile::tempdir().unwrap();
    let xml_path = dir.path().join("dataset.xml");
    std::fs::write(&xml_path, reference_descriptor(&n5_loader(""))).unwrap();

    let opener = SpimDataOpener::new(Arc::new(LocalTransport));
    let err = opener
        .open(&Location::Path(xml_path), ImageDataFormat::BdvN5, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err.cause(),
        Some(ResolveError::Backend(BackendError::IncompleteBackendDescriptor(_)))
    ));
}

#[tokio::test]
async fn test_remote_n5_descriptor_keeps_pool() {
    let loader = format!(r#"<ImageLoader format="bdv.n5.s3">{}</ImageLoader>"#, REMOTE_FIELDS);
    let url = "https://s3.embl.de/i2k-2020/platy/raw.xml";
    let transport = MockTransport::new().with(url, reference_descriptor(&loader));
    let pool = FetchPool::shared();

    let dataset = opener(transport)
        .open(
            &Location::parse(url).unwrap(),
            ImageDataFormat::BdvN5S3,
            Some(pool.clone()),
        )
        .await
        .unwrap();

    assert_eq!(
        dataset.base_path(),
        Some(&Location::parse("https://s3.embl.de/i2k-2020/platy/").unwrap())
    );
    assert!(dataset.image_loader().store().is_remote());
    assert!(Arc::ptr_eq(dataset.image_loader().pool().unwrap(), &pool));

    let array = dataset.image_loader().array(ViewLevel::new(0, 1, 2)).unwrap();
    assert!(Arc::ptr_eq(array.pool.as_ref().unwrap(), &pool));
}

#[tokio::test]
async fn test_hdf5_descriptor_drops_pool() {
    let loader = r#"<ImageLoader format="bdv.hdf5"><hdf5 type="relative">dataset.h5</hdf5></ImageLoader>"#;
    let transport = MockTransport::new().with("/data/dataset.xml", reference_descriptor(loader));

    let dataset = opener(transport)
        .open(
            &Location::parse("/data/dataset.xml").unwrap(),
            ImageDataFormat::BdvHdf5,
            Some(FetchPool::shared()),
        )
        .await
        .unwrap();

    assert!(dataset.image_loader().pool().is_none());
    assert_eq!(dataset.image_loader().layout(), &ArrayLayout::BdvHdf5);
    assert_eq!(
        dataset.image_loader().store(),
        &Store::MonolithicFile {
            file: PathBuf::from("/data/dataset.h5")
        }
    );
    let array = dataset.image_loader().array(ViewLevel::new(1, 0, 3)).unwrap();
    assert_eq!(array.path, "t00001/s00/3/cells");
}

// =============================================================================
// Groups
// =============================================================================

#[tokio::test]
async fn test_remote_ome_zarr_group() {
    let root = "https://s3.embl.de/i2k-2020/images/raw.ome.zarr";
    let transport = with_ome_zarr(MockTransport::new(), root);

    let dataset = opener(transport)
        .open(&Location::parse(root).unwrap(), ImageDataFormat::OmeZarrS3, None)
        .await
        .unwrap();

    let sequence = dataset.sequence();
    assert!(dataset.base_path().is_none());
    assert_eq!(sequence.timepoints().len(), 3);
    assert_eq!(sequence.setups().len(), 2);
    assert_eq!(sequence.channels()[&1], Channel::named(1, "gfp"));
    assert_eq!(dataset.registrations().len(), 6);

    let setup = &sequence.setups()[&0];
    assert_eq!(setup.size, Some([512, 512, 100]));
    assert_eq!(setup.voxel_size.as_ref().unwrap().dimensions, [0.5, 0.5, 2.0]);

    let registration = dataset.registrations().get(ViewId::new(2, 1)).unwrap();
    assert_eq!(registration.transform.apply([2.0, 2.0, 2.0]), [1.0, 1.0, 4.0]);

    let loader = dataset.image_loader();
    assert_eq!(loader.level_count(), Some(2));
    let array = loader.array(ViewLevel::new(2, 1, 1)).unwrap();
    assert_eq!(array.path, "s1");
    assert_eq!(array.selection, vec![(0, 2), (1, 1)]);
    assert!(matches!(
        loader.array(ViewLevel::new(0, 0, 2)),
        Err(BackendError::LevelOutOfRange { level: 2, count: 2 })
    ));
}

#[tokio::test]
async fn test_local_ome_zarr_group_keeps_pool() {
    let transport = with_ome_zarr(MockTransport::new(), "/data/raw.ome.zarr");
    let pool = FetchPool::shared();

    let dataset = opener(transport)
        .open(
            &Location::parse("/data/raw.ome.zarr").unwrap(),
            ImageDataFormat::OmeZarr,
            Some(pool.clone()),
        )
        .await
        .unwrap();

    assert!(Arc::ptr_eq(dataset.image_loader().pool().unwrap(), &pool));
}

#[tokio::test]
async fn test_openorganelle_group_drops_pool() {
    let root = "https://janelia-cosem-datasets.s3.amazonaws.com/jrc_hela-3/jrc_hela-3.n5/em/fibsem-uint8";
    // virtual-hosted URLs are read through the default AWS endpoint
    let store = "s3://janelia-cosem-datasets/jrc_hela-3/jrc_hela-3.n5/em/fibsem-uint8";
    let transport = MockTransport::new()
        .with(&format!("{}/attributes.json", store), N5_ROOT_ATTRS)
        .with(&format!("{}/s0/attributes.json", store), N5_LEVEL_ATTRS);

    let dataset = opener(transport)
        .open(
            &Location::parse(root).unwrap(),
            ImageDataFormat::OpenOrganelleS3,
            Some(FetchPool::shared()),
        )
        .await
        .unwrap();

    assert!(dataset.image_loader().pool().is_none());
    match dataset.image_loader().store() {
        Store::RemoteObject { address } => {
            assert_eq!(address.endpoint, None);
            assert_eq!(address.bucket, "janelia-cosem-datasets");
        }
        other => panic!("expected a remote store, got {:?}", other),
    }
    let setup = &dataset.sequence().setups()[&0];
    assert_eq!(setup.size, Some([1024, 512, 256]));
    let voxel = setup.voxel_size.as_ref().unwrap();
    assert_eq!(voxel.unit, "nm");
    assert_eq!(voxel.dimensions, [4.0, 4.0, 8.0]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_unregistered_format() {
    let result = opener(MockTransport::new())
        .open(
            &Location::parse("/data/image.ims").unwrap(),
            ImageDataFormat::Imaris,
            None,
        )
        .await;

    assert!(matches!(
        result,
        Err(OpenError::UnsupportedFormat(ImageDataFormat::Imaris))
    ));
}

#[tokio::test]
async fn test_missing_descriptor() {
    let transport = MockTransport::new();
    let err = opener(transport.clone())
        .open(
            &Location::parse("/data/missing.xml").unwrap(),
            ImageDataFormat::BdvN5,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OpenError::OpenFailure(ResolveError::Io(IoError::NotFound(_)))
    ));
    assert_eq!(transport.read_count(), 1);
}

#[tokio::test]
async fn test_dataset_serializes_to_json() {
    let root = "/data/raw.ome.zarr";
    let transport = with_ome_zarr(MockTransport::new(), root);

    let dataset = opener(transport)
        .open(&Location::parse(root).unwrap(), ImageDataFormat::OmeZarr, None)
        .await
        .unwrap();
    let json = serde_json::to_value(&dataset).unwrap();

    assert_eq!(json["sequence"]["image_loader"]["store"]["type"], "local_array");
    assert_eq!(json["registrations"].as_array().unwrap().len(), 6);
}
