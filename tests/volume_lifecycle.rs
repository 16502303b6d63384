//! Behavioural tests for volume and snapshot lifecycle operations.

#[path = "common/volumes.rs"]
mod volumes;

use k2_array::array::Method;
use k2_array::test_support::fake_driver;
use k2_array::volume::KIB_PER_GIB;
use k2_array::{ArrayError, ErrorKind, Operation, SnapshotSpec, VolumeSpec};
use rstest::rstest;
use serde_json::Value;

#[tokio::test]
async fn create_volume_stores_group_and_volume() {
    let (driver, array) = fake_driver();

    let created = driver
        .create_volume(&VolumeSpec::new("vol-1", 2))
        .await
        .expect("volume is created");

    assert_eq!(created.name, "cv-vol-1");
    assert_eq!(created.size, 2 * KIB_PER_GIB);
    let group = array
        .find("volume_groups", "name", "cvg-vol-1")
        .expect("group exists");
    assert_eq!(group.get("is_dedup"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn failed_volume_creation_leaves_no_group_behind() {
    let (driver, array) = fake_driver();
    array.fail_next(
        Method::Post,
        "volumes",
        ArrayError::Request {
            status: 500,
            body: String::from("out of space"),
        },
    );

    let err = driver
        .create_volume(&VolumeSpec::new("vol-1", 2))
        .await
        .expect_err("creation fails");

    assert!(matches!(
        &err,
        k2_array::DriverError::Operation {
            operation: Operation::CreateVolume,
            ..
        }
    ));
    assert!(!array.has_named("volume_groups", "cvg-vol-1"));
    assert!(!array.has_named("volumes", "cv-vol-1"));
}

#[rstest]
#[case::created_then_deleted_twice(true)]
#[case::never_created(false)]
#[tokio::test]
async fn delete_volume_is_idempotent(#[case] create_first: bool) {
    let (driver, array) = fake_driver();
    if create_first {
        volumes::seed_volume(&array, "vol-1", 1, true);
    }

    driver.delete_volume("vol-1").await.expect("first delete");
    driver.delete_volume("vol-1").await.expect("second delete");

    assert_eq!(array.count("volumes"), 0);
    assert_eq!(array.count("volume_groups"), 0);
}

#[tokio::test]
async fn extend_volume_updates_size_in_kib() {
    let (driver, array) = fake_driver();
    volumes::seed_volume(&array, "vol-1", 1, true);

    driver.extend_volume("vol-1", 5).await.expect("extend");

    let volume = array.find("volumes", "name", "cv-vol-1").expect("volume");
    assert_eq!(
        volume.get("size").and_then(Value::as_u64),
        Some(5 * KIB_PER_GIB)
    );
}

#[tokio::test]
async fn extending_a_missing_volume_reports_not_found() {
    let (driver, _array) = fake_driver();

    let err = driver
        .extend_volume("ghost", 5)
        .await
        .expect_err("volume is missing");

    assert_eq!(err.kind(), ErrorKind::Operation);
    assert_eq!(err.root_kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn snapshots_are_taken_of_the_volume_group() {
    let (driver, array) = fake_driver();
    let (group, _) = volumes::seed_volume(&array, "vol-1", 1, true);

    driver
        .create_snapshot(&SnapshotSpec::new("snap-1", "vol-1", 1))
        .await
        .expect("snapshot");

    let snapshot = array
        .find("snapshots", "short_name", "cs-snap-1")
        .expect("snapshot stored");
    let source_ref = format!("/volume_groups/{group}");
    assert_eq!(
        snapshot
            .get("source")
            .and_then(|source| source.get("ref"))
            .and_then(Value::as_str),
        Some(source_ref.as_str())
    );
    assert_eq!(snapshot.get("is_exposable"), Some(&Value::Bool(false)));
    assert_eq!(array.count("volsnaps"), 0);

    driver.delete_snapshot("snap-1").await.expect("delete");
    driver.delete_snapshot("snap-1").await.expect("delete again");
    assert_eq!(array.count("snapshots"), 0);
}

#[tokio::test]
async fn snapshot_of_missing_volume_is_rejected() {
    let (driver, array) = fake_driver();

    let err = driver
        .create_snapshot(&SnapshotSpec::new("snap-1", "ghost", 1))
        .await
        .expect_err("no group to snapshot");

    assert_eq!(err.root_kind(), ErrorKind::NotFound);
    assert_eq!(array.count("snapshots"), 0);
}

#[tokio::test]
async fn after_volume_copy_moves_original_names_onto_the_copy() {
    let (driver, array) = fake_driver();
    volumes::seed_volume(&array, "old", 1, true);
    let (new_group, new_volume) = volumes::seed_volume(&array, "new", 1, true);

    driver
        .after_volume_copy("old", "new")
        .await
        .expect("names are swapped");

    let volume = array.find("volumes", "name", "cv-old").expect("volume");
    assert_eq!(volume.get("id").and_then(Value::as_u64), Some(new_volume));
    let group = array.find("volume_groups", "name", "cvg-old").expect("group");
    assert_eq!(group.get("id").and_then(Value::as_u64), Some(new_group));
    assert!(!array.has_named("volumes", "cv-new"));
    assert_eq!(array.count("volumes"), 1);
}
