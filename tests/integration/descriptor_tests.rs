//! Scene descriptor integration tests.
//!
//! Tests verify:
//! - The reference dataset parses, writes and parses back unchanged
//! - Range timepoints are re-indexed from zero
//! - Registrations naming unknown views are rejected
//! - Setups without a channel fall back to channel 0

use spim_resolver::descriptor::{parse_scene_descriptor, write_scene_descriptor};
use spim_resolver::error::DescriptorError;
use spim_resolver::model::ViewId;

use super::test_utils::{descriptor, reference_descriptor, registration, registrations, setup};

const N5_LOADER: &str = r#"<ImageLoader format="bdv.n5.s3">
      <ServiceEndpoint>https://s3.embl.de</ServiceEndpoint>
      <SigningRegion>us-west-2</SigningRegion>
      <BucketName>i2k-2020</BucketName>
      <Key>platy/raw.n5</Key>
    </ImageLoader>"#;

// =============================================================================
// Reference Dataset
// =============================================================================

#[test]
fn test_reference_dataset() {
    let parsed = parse_scene_descriptor(reference_descriptor(N5_LOADER).as_bytes()).unwrap();

    assert_eq!(parsed.shell.timepoints.len(), 3);
    assert_eq!(parsed.shell.setups.len(), 2);
    assert_eq!(parsed.registrations.len(), 6);

    for setup in parsed.shell.setups.values() {
        assert_eq!(setup.size, Some([512, 512, 100]));
        let voxel = setup.voxel_size.as_ref().unwrap();
        assert_eq!(voxel.unit, "µm");
        assert_eq!(voxel.dimensions, [0.5, 0.5, 2.0]);
    }
    for registration in parsed.registrations.iter() {
        assert_eq!(registration.transform.apply([3.0, 4.0, 5.0]), [3.0, 4.0, 5.0]);
    }

    let loader = parsed.image_loader.as_ref().unwrap();
    assert_eq!(loader.format, "bdv.n5.s3");
    assert_eq!(loader.text("Key"), Some("platy/raw.n5"));
}

#[test]
fn test_reference_dataset_round_trip() {
    let parsed = parse_scene_descriptor(reference_descriptor(N5_LOADER).as_bytes()).unwrap();

    let written = write_scene_descriptor(&parsed).unwrap();
    let reparsed = parse_scene_descriptor(written.as_bytes()).unwrap();

    assert_eq!(reparsed, parsed);
}

// =============================================================================
// Timepoints
// =============================================================================

#[test]
fn test_range_count_and_reindexing() {
    let xml = descriptor(
        N5_LOADER,
        10,
        13,
        &setup(0, 0),
        &registrations(10..=13, 1),
    );
    let parsed = parse_scene_descriptor(xml.as_bytes()).unwrap();

    let ids: Vec<u32> = parsed.shell.timepoints.keys().copied().collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    for t in 0..4 {
        assert!(parsed.registrations.get(ViewId::new(t, 0)).is_some());
    }
}

#[test]
fn test_inverted_range_is_malformed() {
    let xml = descriptor(N5_LOADER, 5, 4, &setup(0, 0), "");
    assert!(matches!(
        parse_scene_descriptor(xml.as_bytes()),
        Err(DescriptorError::Malformed(_))
    ));
}

// =============================================================================
// Registrations
// =============================================================================

#[test]
fn test_unknown_views_are_rejected() {
    let past_range = descriptor(N5_LOADER, 0, 2, &setup(0, 0), &registration(3, 0));
    let unknown_setup = descriptor(N5_LOADER, 0, 2, &setup(0, 0), &registration(0, 7));

    for xml in [past_range, unknown_setup] {
        assert!(matches!(
            parse_scene_descriptor(xml.as_bytes()),
            Err(DescriptorError::Malformed(_))
        ));
    }
}

// =============================================================================
// Setups
// =============================================================================

#[test]
fn test_missing_channel_is_zero() {
    let setups = r#"
      <ViewSetup><id>0</id><size>64 64 8</size></ViewSetup>
      <ViewSetup><id>1</id><attributes><angle>2</angle></attributes></ViewSetup>"#;
    let xml = descriptor(N5_LOADER, 0, 0, setups, &registrations(0..1, 2));
    let parsed = parse_scene_descriptor(xml.as_bytes()).unwrap();

    assert_eq!(parsed.shell.setups[&0].channel, 0);
    assert_eq!(parsed.shell.setups[&1].channel, 0);
    assert_eq!(parsed.shell.setups[&1].angle, 2);
    assert!(parsed.shell.channels.contains_key(&0));
}
