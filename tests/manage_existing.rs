//! Behavioural tests for adopting volumes created outside the driver.

#[path = "common/hosts.rs"]
mod hosts;

use k2_array::array::Method;
use k2_array::naming::{NO_DEDUP, THIN_PROV_TYPE_KEY};
use k2_array::test_support::{FakeArray, fake_driver};
use k2_array::{ArrayError, ErrorKind, ExistingRef, VolumeSpec, VolumeType};
use rstest::rstest;
use serde_json::json;

const LEGACY_GROUP: &str = "legacy-vg";

fn seed_legacy(array: &FakeArray, size_kib: u64, dedup: bool) -> u64 {
    let group = array.insert(
        "volume_groups",
        json!({"name": LEGACY_GROUP, "quota": 0, "is_dedup": dedup}),
    );
    array.insert(
        "volumes",
        json!({
            "name": "legacy",
            "size": size_kib,
            "volume_group": {"ref": format!("/volume_groups/{group}")},
        }),
    )
}

fn nodedup() -> Option<VolumeType> {
    Some(VolumeType::default().with_extra_spec(THIN_PROV_TYPE_KEY, NO_DEDUP))
}

#[rstest]
#[case::exact(1_048_576, 1)]
#[case::fractional_rounds_up(1_572_864, 2)]
#[case::just_over(1_048_577, 2)]
#[tokio::test]
async fn size_is_rounded_up_to_whole_gib(#[case] size_kib: u64, #[case] expected_gb: u64) {
    let (driver, array) = fake_driver();
    seed_legacy(&array, size_kib, true);

    let size = driver
        .manage_existing_get_size(&ExistingRef::new("legacy"))
        .await
        .expect("size is known");

    assert_eq!(size, expected_gb);
}

#[tokio::test]
async fn size_of_unknown_volume_is_an_invalid_reference() {
    let (driver, _array) = fake_driver();

    let err = driver
        .manage_existing_get_size(&ExistingRef::new("ghost"))
        .await
        .expect_err("volume is missing");

    assert_eq!(err.kind(), ErrorKind::InvalidReference);
}

#[tokio::test]
async fn adopted_volume_takes_derived_names() {
    let (driver, array) = fake_driver();
    seed_legacy(&array, 1_048_576, true);

    driver
        .manage_existing(&VolumeSpec::new("vol-1", 1), &ExistingRef::new("legacy"))
        .await
        .expect("volume adopted");

    assert!(array.has_named("volumes", "cv-vol-1"));
    assert!(array.has_named("volume_groups", "cvg-vol-1"));
    assert!(!array.has_named("volumes", "legacy"));
    assert!(!array.has_named("volume_groups", LEGACY_GROUP));
}

#[tokio::test]
async fn nodedup_volume_type_adopts_nodedup_volume() {
    let (driver, array) = fake_driver();
    seed_legacy(&array, 1_048_576, false);

    driver
        .manage_existing(
            &VolumeSpec::new("vol-1", 1).volume_type(nodedup()),
            &ExistingRef::new("legacy"),
        )
        .await
        .expect("provisioning matches");

    assert!(array.has_named("volumes", "cv-vol-1"));
}

#[rstest]
#[case::dedup_volume_for_nodedup_type(true, true)]
#[case::nodedup_volume_for_default_type(false, false)]
#[tokio::test]
async fn provisioning_mismatch_is_rejected(#[case] dedup: bool, #[case] nodedup_type: bool) {
    let (driver, array) = fake_driver();
    seed_legacy(&array, 1_048_576, dedup);
    let spec = VolumeSpec::new("vol-1", 1).volume_type(if nodedup_type { nodedup() } else { None });

    let err = driver
        .manage_existing(&spec, &ExistingRef::new("legacy"))
        .await
        .expect_err("mismatch");

    assert_eq!(err.kind(), ErrorKind::InvalidReference);
    assert!(array.has_named("volumes", "legacy"));
    assert!(array.has_named("volume_groups", LEGACY_GROUP));
}

#[tokio::test]
async fn mapped_volume_is_rejected() {
    let (driver, array) = fake_driver();
    let volume = seed_legacy(&array, 1_048_576, true);
    let host = hosts::seed_host(&array, hosts::HOST);
    hosts::seed_mapping(&array, volume, host);

    let err = driver
        .manage_existing(&VolumeSpec::new("vol-1", 1), &ExistingRef::new("legacy"))
        .await
        .expect_err("volume is mapped");

    assert_eq!(err.kind(), ErrorKind::InvalidReference);
    assert!(array.has_named("volumes", "legacy"));
}

#[tokio::test]
async fn failed_volume_rename_restores_group_name() {
    let (driver, array) = fake_driver();
    seed_legacy(&array, 1_048_576, true);
    array.fail_next(
        Method::Patch,
        "volumes",
        ArrayError::Request {
            status: 500,
            body: String::from("rename refused"),
        },
    );

    let err = driver
        .manage_existing(&VolumeSpec::new("vol-1", 1), &ExistingRef::new("legacy"))
        .await
        .expect_err("rename fails");

    assert_eq!(err.kind(), ErrorKind::InvalidReference);
    assert!(array.has_named("volume_groups", LEGACY_GROUP));
    assert!(!array.has_named("volume_groups", "cvg-vol-1"));
    assert!(array.has_named("volumes", "legacy"));
}

#[tokio::test]
async fn failed_rename_leaves_unrelated_group_with_derived_name_alone() {
    let (driver, array) = fake_driver();
    seed_legacy(&array, 1_048_576, true);
    let foreign = array.insert(
        "volume_groups",
        json!({"name": "cvg-vol-1", "quota": 0, "is_dedup": true}),
    );
    array.fail_next(
        Method::Patch,
        "volumes",
        ArrayError::Request {
            status: 500,
            body: String::from("rename refused"),
        },
    );

    let err = driver
        .manage_existing(&VolumeSpec::new("vol-1", 1), &ExistingRef::new("legacy"))
        .await
        .expect_err("rename fails");

    assert_eq!(err.kind(), ErrorKind::InvalidReference);
    let foreign_group = array
        .objects("volume_groups")
        .into_iter()
        .find(|group| group.get("id").and_then(serde_json::Value::as_u64) == Some(foreign))
        .expect("foreign group still exists");
    assert_eq!(
        foreign_group.get("name").and_then(serde_json::Value::as_str),
        Some("cvg-vol-1")
    );
    assert!(array.has_named("volume_groups", LEGACY_GROUP));
}
