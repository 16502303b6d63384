//! Orchestrator-side volume and snapshot descriptions.
//!
//! These are the inputs the orchestrator hands to the driver. Sizes are in
//! GiB, the orchestrator's capacity unit.

use std::collections::BTreeMap;

/// KiB per GiB, the factor between orchestrator and array sizes.
pub const KIB_PER_GIB: u64 = 1024 * 1024;

/// MiB per GiB, used to size block copies.
pub const MIB_PER_GIB: u64 = 1024;

/// Volume type carrying provisioning extra specs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VolumeType {
    /// Extra specification key/value pairs.
    pub extra_specs: BTreeMap<String, String>,
}

impl VolumeType {
    /// Adds an extra spec.
    #[must_use]
    pub fn with_extra_spec(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_specs.insert(key.into(), value.into());
        self
    }

    /// Returns the value of extra spec `key`, if set.
    #[must_use]
    pub fn extra_spec(&self, key: &str) -> Option<&str> {
        self.extra_specs.get(key).map(String::as_str)
    }
}

/// A volume as known to the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSpec {
    /// Orchestrator identifier.
    pub id: String,
    /// Size in GiB.
    pub size_gb: u64,
    /// Type of the volume, if any.
    pub volume_type: Option<VolumeType>,
}

impl VolumeSpec {
    /// Creates an untyped volume description, trimming the identifier.
    #[must_use]
    pub fn new(id: impl Into<String>, size_gb: u64) -> Self {
        Self {
            id: id.into().trim().to_owned(),
            size_gb,
            volume_type: None,
        }
    }

    /// Sets the volume type.
    #[must_use]
    pub fn volume_type(mut self, value: Option<VolumeType>) -> Self {
        self.volume_type = value;
        self
    }

    /// Size in KiB as stored on the array.
    #[must_use]
    pub const fn size_kib(&self) -> u64 {
        self.size_gb.saturating_mul(KIB_PER_GIB)
    }
}

/// A snapshot as known to the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotSpec {
    /// Orchestrator identifier of the snapshot.
    pub id: String,
    /// Identifier of the volume the snapshot was taken from.
    pub volume_id: String,
    /// Size in GiB of the source volume.
    pub volume_size_gb: u64,
}

impl SnapshotSpec {
    /// Creates a snapshot description, trimming the identifiers.
    #[must_use]
    pub fn new(id: impl Into<String>, volume_id: impl Into<String>, volume_size_gb: u64) -> Self {
        Self {
            id: id.into().trim().to_owned(),
            volume_id: volume_id.into().trim().to_owned(),
            volume_size_gb,
        }
    }
}

/// Reference to a pre-existing array volume to bring under management.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExistingRef {
    /// Name of the volume on the array.
    pub source_name: String,
}

impl ExistingRef {
    /// Creates a reference to the array volume named `source_name`.
    #[must_use]
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_trims_identifier_and_converts_size() {
        let spec = VolumeSpec::new("  abc ", 3);
        assert_eq!(spec.id, "abc");
        assert_eq!(spec.size_kib(), 3 * 1_048_576);
    }

    #[test]
    fn extra_spec_lookup() {
        let kind = VolumeType::default().with_extra_spec("k", "v");
        assert_eq!(kind.extra_spec("k"), Some("v"));
        assert_eq!(kind.extra_spec("missing"), None);
    }
}
