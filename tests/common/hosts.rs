//! Shared host and mapping fixtures for driver integration tests.
//!
//! Pulled into a test crate with:
//!
//! ```rust
//! #[path = "common/hosts.rs"]
//! mod hosts;
//! ```

use k2_array::test_support::FakeArray;
use serde_json::json;

/// Host name reported by the scripted host.
pub const HOST: &str = "compute-01";

/// Stores a host named `name` and returns its id.
pub fn seed_host(array: &FakeArray, name: &str) -> u64 {
    array.insert("hosts", json!({"name": name, "type": "Linux"}))
}

/// Maps volume `volume` to host `host` and returns the mapping id.
pub fn seed_mapping(array: &FakeArray, volume: u64, host: u64) -> u64 {
    array.insert(
        "mappings",
        json!({
            "volume": {"ref": format!("/volumes/{volume}")},
            "host": {"ref": format!("/hosts/{host}")},
            "lun": 1,
        }),
    )
}
