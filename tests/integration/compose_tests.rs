//! Composed dataset integration tests.
//!
//! Tests verify:
//! - A BDV descriptor takes its image loader from an OME-Zarr group
//! - Channels are merged additively
//! - Composition is all-or-nothing, naming the failed stage
//! - The local group path falls through to the remote fields

use std::path::PathBuf;
use std::sync::Arc;

use spim_resolver::backend::{ArrayLayout, Store};
use spim_resolver::error::{ComposeStage, IoError, OpenError, ResolveError};
use spim_resolver::io::{FetchPool, Location};
use spim_resolver::model::Channel;
use spim_resolver::open::ImageDataFormat;

use super::test_utils::{
    descriptor, opener, reference_descriptor, registrations, setup, with_ome_zarr, MockTransport,
    REMOTE_FIELDS,
};

const DESCRIPTOR: &str = "/data/project/dataset.xml";
const LOCAL_GROUP: &str = "/data/project/images/raw.ome.zarr";
const REMOTE_GROUP: &str = "https://s3.embl.de/i2k-2020/platy/raw.ome.zarr";

fn zarr_loader(extra: &str) -> String {
    format!(
        r#"<ImageLoader format="bdv.ome.zarr">
      <ome.zarr type="relative">images/raw.ome.zarr</ome.zarr>{}
    </ImageLoader>"#,
        extra
    )
}

fn failed_stage(err: &OpenError) -> Option<ComposeStage> {
    match err {
        OpenError::ComposeFailure { stage, .. } => Some(*stage),
        _ => None,
    }
}

// =============================================================================
// Successful Composition
// =============================================================================

#[tokio::test]
async fn test_local_composition() {
    let transport = with_ome_zarr(
        MockTransport::new().with(DESCRIPTOR, reference_descriptor(&zarr_loader(""))),
        LOCAL_GROUP,
    );
    let pool = FetchPool::shared();

    let dataset = opener(transport)
        .open(
            &Location::parse(DESCRIPTOR).unwrap(),
            ImageDataFormat::BdvOmeZarr,
            Some(pool.clone()),
        )
        .await
        .unwrap();

    // sequence and registrations come from the descriptor
    assert_eq!(
        dataset.base_path(),
        Some(&Location::Path(PathBuf::from("/data/project")))
    );
    assert_eq!(dataset.sequence().timepoints().len(), 3);
    assert_eq!(dataset.sequence().setups()[&0].name.as_deref(), Some("setup 0"));
    assert_eq!(dataset.registrations().len(), 6);

    // loader comes from the group
    let loader = dataset.image_loader();
    assert_eq!(
        loader.store(),
        &Store::LocalArray {
            root: PathBuf::from(LOCAL_GROUP)
        }
    );
    assert!(matches!(loader.layout(), ArrayLayout::Multiscale { .. }));
    assert!(Arc::ptr_eq(loader.pool().unwrap(), &pool));
}

#[tokio::test]
async fn test_channel_merge_is_additive() {
    let setups = format!(
        r#"{}
      <Attributes name="channel">
        <Channel><id>0</id><name>nuclei</name></Channel>
      </Attributes>"#,
        setup(0, 0)
    );
    let xml = descriptor(&zarr_loader(""), 0, 2, &setups, &registrations(0..3, 1));
    let transport = with_ome_zarr(MockTransport::new().with(DESCRIPTOR, xml), LOCAL_GROUP);

    let dataset = opener(transport)
        .open(
            &Location::parse(DESCRIPTOR).unwrap(),
            ImageDataFormat::BdvOmeZarr,
            None,
        )
        .await
        .unwrap();

    let channels = dataset.sequence().channels();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[&0], Channel::named(0, "nuclei"));
    assert_eq!(channels[&1], Channel::named(1, "gfp"));
    assert_eq!(dataset.sequence().setups().len(), 1);
}

#[tokio::test]
async fn test_missing_local_group_falls_through_to_remote() {
    let transport = with_ome_zarr(
        MockTransport::new().with(DESCRIPTOR, reference_descriptor(&zarr_loader(REMOTE_FIELDS))),
        REMOTE_GROUP,
    );

    let dataset = opener(transport)
        .open(
            &Location::parse(DESCRIPTOR).unwrap(),
            ImageDataFormat::BdvOmeZarr,
            None,
        )
        .await
        .unwrap();

    match dataset.image_loader().store() {
        Store::RemoteObject { address } => {
            assert_eq!(address.bucket, "i2k-2020");
            assert_eq!(address.key, "platy/raw.ome.zarr");
        }
        other => panic!("expected a remote store, got {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_composition() {
    let url = "https://s3.embl.de/i2k-2020/platy/raw.xml";
    let loader = format!(
        r#"<ImageLoader format="bdv.ome.zarr.s3">{}</ImageLoader>"#,
        REMOTE_FIELDS
    );
    let transport = with_ome_zarr(
        MockTransport::new().with(url, reference_descriptor(&loader)),
        REMOTE_GROUP,
    );

    let dataset = opener(transport)
        .open(
            &Location::parse(url).unwrap(),
            ImageDataFormat::BdvOmeZarrS3,
            None,
        )
        .await
        .unwrap();

    assert!(dataset.base_path().is_none());
    assert!(dataset.image_loader().store().is_remote());
    assert_eq!(dataset.registrations().len(), 6);
}

#[tokio::test]
async fn test_group_reads_sign_with_descriptor_region() {
    let url = "https://s3.embl.de/i2k-2020/platy/raw.xml";
    let loader = format!(
        r#"<ImageLoader format="bdv.ome.zarr.s3">{}</ImageLoader>"#,
        REMOTE_FIELDS
    );
    let transport = with_ome_zarr(
        MockTransport::new().with(url, reference_descriptor(&loader)),
        REMOTE_GROUP,
    );

    opener(transport.clone())
        .open(
            &Location::parse(url).unwrap(),
            ImageDataFormat::BdvOmeZarrS3,
            None,
        )
        .await
        .unwrap();

    // descriptor by URL, then .zattrs and .zarray through the loader's address
    let reads = transport.reads();
    assert_eq!(reads.len(), 3);
    for read in &reads[1..] {
        match read {
            Location::Object(address) => assert_eq!(address.region, "us-west-2"),
            other => panic!("expected an object location, got {:?}", other),
        }
    }
}

// =============================================================================
// All-or-nothing Failures
// =============================================================================

#[tokio::test]
async fn test_malformed_descriptor_fails_primary() {
    let transport = with_ome_zarr(
        MockTransport::new().with(DESCRIPTOR, "<SpimData><Broken"),
        LOCAL_GROUP,
    );

    let err = opener(transport)
        .open(
            &Location::parse(DESCRIPTOR).unwrap(),
            ImageDataFormat::BdvOmeZarr,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(failed_stage(&err), Some(ComposeStage::Primary));
}

#[tokio::test]
async fn test_missing_group_fails_secondary() {
    // local path exists but the group documents are gone
    let transport = MockTransport::new()
        .with(DESCRIPTOR, reference_descriptor(&zarr_loader("")))
        .with(&format!("{}/README", LOCAL_GROUP), "moved");

    let err = opener(transport)
        .open(
            &Location::parse(DESCRIPTOR).unwrap(),
            ImageDataFormat::BdvOmeZarr,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(failed_stage(&err), Some(ComposeStage::Secondary));
    assert!(matches!(
        err.cause(),
        Some(ResolveError::Attributes(_)) | Some(ResolveError::Io(IoError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_timepoints_beyond_group_time_axis_fail_merge() {
    let single_timepoint = r#"{
        "shape": [1, 2, 100, 512, 512],
        "chunks": [1, 1, 32, 64, 64],
        "dtype": "<u2",
        "compressor": {"id": "blosc"},
        "zarr_format": 2
    }"#;
    let transport = with_ome_zarr(
        MockTransport::new().with(DESCRIPTOR, reference_descriptor(&zarr_loader(""))),
        LOCAL_GROUP,
    )
    .with(&format!("{}/s0/.zarray", LOCAL_GROUP), single_timepoint);

    let err = opener(transport)
        .open(
            &Location::parse(DESCRIPTOR).unwrap(),
            ImageDataFormat::BdvOmeZarr,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(failed_stage(&err), Some(ComposeStage::Merge));
}

#[tokio::test]
async fn test_setup_beyond_group_channels_fails_merge() {
    let setups = format!("{}{}{}", setup(0, 0), setup(1, 1), setup(2, 2));
    let xml = descriptor(&zarr_loader(""), 0, 0, &setups, &registrations(0..1, 3));
    let transport = with_ome_zarr(MockTransport::new().with(DESCRIPTOR, xml), LOCAL_GROUP);

    let err = opener(transport)
        .open(
            &Location::parse(DESCRIPTOR).unwrap(),
            ImageDataFormat::BdvOmeZarr,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(failed_stage(&err), Some(ComposeStage::Merge));
}
