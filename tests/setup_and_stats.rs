//! Behavioural tests for start-up checks and capacity reporting.

#[path = "common/volumes.rs"]
mod volumes;

use k2_array::test_support::{fake_driver, valid_config};
use k2_array::{ErrorKind, K2Driver, VolumeStats};
use rstest::rstest;
use serde_json::{Value, json};

#[rstest]
#[case::exact("2.2.0")]
#[case::short("2.2")]
#[case::newer("3.0.1")]
#[tokio::test]
async fn supported_api_versions_pass_setup(#[case] version: &str) {
    let (driver, array) = fake_driver();
    array.clear("system/state");
    array.insert("system/state", json!({"rest_api_version": version}));

    driver.check_for_setup_error().await.expect("supported");
}

#[rstest]
#[case::older("2.1")]
#[case::much_older("1.9.9")]
#[tokio::test]
async fn old_api_versions_fail_setup(#[case] version: &str) {
    let (driver, array) = fake_driver();
    array.clear("system/state");
    array.insert("system/state", json!({"rest_api_version": version}));

    let err = driver
        .check_for_setup_error()
        .await
        .expect_err("too old");

    assert_eq!(err.kind(), ErrorKind::Setup);
    assert!(err.to_string().contains(version));
}

#[tokio::test]
async fn missing_system_state_fails_setup() {
    let (driver, array) = fake_driver();
    array.clear("system/state");

    let err = driver
        .check_for_setup_error()
        .await
        .expect_err("no version");

    assert_eq!(err.kind(), ErrorKind::Setup);
}

#[tokio::test]
async fn stats_report_capacity_in_gib() {
    let (driver, array) = fake_driver();
    volumes::seed_volume(&array, "a", 1, true);
    volumes::seed_volume(&array, "b", 1, true);

    let stats = driver.get_volume_stats(true).await.expect("stats");
    let capacity = stats.capacity.expect("refreshed");

    assert_eq!(capacity.free_capacity_gb.to_bits(), 8.0_f64.to_bits());
    assert_eq!(capacity.total_capacity_gb.to_bits(), 10.0_f64.to_bits());
    assert_eq!(capacity.provisioned_capacity_gb.to_bits(), 4.0_f64.to_bits());
    assert_eq!(
        capacity.max_oversubscription_ratio.to_bits(),
        driver.config().max_over_subscription_ratio.to_bits()
    );
    assert_eq!(capacity.total_volumes, 1);
    assert!(capacity.thin_provisioning_support);
    assert!(!capacity.thick_provisioning_support);
}

#[tokio::test]
async fn auto_calculated_ratio_uses_live_counters() {
    let (_, array) = fake_driver();
    let config = k2_array::K2Config {
        auto_calc_max_oversubscription_ratio: Some(true),
        ..valid_config()
    };
    let driver = K2Driver::with_transport(config, array.clone()).expect("driver");

    let capacity = driver.update_volume_stats().await.expect("stats");

    // 4 GiB provisioned over 2 GiB allocated.
    assert_eq!(capacity.max_oversubscription_ratio.to_bits(), 2.0_f64.to_bits());
}

#[tokio::test]
async fn stats_without_refresh_omit_capacity() {
    let (driver, array) = fake_driver();

    let stats: VolumeStats = driver.get_volume_stats(false).await.expect("stats");

    assert!(stats.capacity.is_none());
    assert_eq!(stats.volume_backend_name, "KaminarioK2Driver");
    assert_eq!(stats.vendor_name, "Kaminario");
    assert_eq!(stats.storage_protocol, "iSCSI");
    assert!(array.requests().is_empty());
}

#[tokio::test]
async fn stats_serialise_with_orchestrator_keys() {
    let (driver, _array) = fake_driver();

    let stats = driver.get_volume_stats(true).await.expect("stats");
    let rendered = serde_json::to_value(&stats).expect("serialise");

    assert_eq!(rendered.get("QoS_support"), Some(&Value::Bool(false)));
    assert_eq!(
        rendered.get("kaminario:thin_prov_type").and_then(Value::as_str),
        Some("dedup/nodedup")
    );
    assert_eq!(rendered.get("total_volumes").and_then(Value::as_u64), Some(0));
}
