//! Shared volume fixtures for driver integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared helpers under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/volumes.rs"]
//! mod volumes;
//! ```

use k2_array::test_support::FakeArray;
use k2_array::volume::KIB_PER_GIB;
use serde_json::json;

/// Stores a volume group and a volume named after `volume_id` and returns
/// their ids.
pub fn seed_volume(array: &FakeArray, volume_id: &str, size_gb: u64, dedup: bool) -> (u64, u64) {
    let group = array.insert(
        "volume_groups",
        json!({"name": format!("cvg-{volume_id}"), "quota": 0, "is_dedup": dedup}),
    );
    let volume = array.insert(
        "volumes",
        json!({
            "name": format!("cv-{volume_id}"),
            "size": size_gb * KIB_PER_GIB,
            "volume_group": {"ref": format!("/volume_groups/{group}")},
        }),
    );
    (group, volume)
}
