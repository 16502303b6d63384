//! Typed array resources and the drafts used to create them.
//!
//! Responses are decoded into one struct per resource kind at the
//! repository boundary; references to other objects travel as
//! `{"ref": "/collection/id"}`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Reference to an array object, for example `/volumes/7`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ObjectRef {
    #[serde(rename = "ref")]
    path: String,
}

impl ObjectRef {
    /// Builds the reference of object `id` in `collection`.
    #[must_use]
    pub fn new(collection: &str, id: u64) -> Self {
        Self {
            path: format!("/{collection}/{id}"),
        }
    }

    /// Returns the reference path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true when the reference points into `collection`.
    #[must_use]
    pub fn is_in(&self, collection: &str) -> bool {
        self.path
            .strip_prefix('/')
            .and_then(|rest| rest.rsplit_once('/'))
            .is_some_and(|(prefix, _)| prefix == collection)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// An object living in one of the array's collections.
pub trait Resource: Clone + DeserializeOwned + Send + Sync {
    /// Collection path relative to the API root.
    const COLLECTION: &'static str;
    /// Human readable kind used in log lines and errors.
    const KIND: &'static str;

    /// Array assigned identifier.
    fn id(&self) -> u64;

    /// Reference used to point other objects at this one.
    fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(Self::COLLECTION, self.id())
    }
}

/// Resources whose mutable fields can be written back with a save.
pub trait Savable: Resource {
    /// Fields sent when the object is saved.
    fn changes(&self) -> Value;
}

/// Resources exposing a lifecycle state that can be polled.
pub trait Stateful: Resource {
    /// Current state as reported by the array.
    fn state(&self) -> Option<&str>;
}

/// Payload for creating a new object.
pub trait Draft: Serialize + Sync {
    /// Resource produced once the array accepts the draft.
    type Output: Resource;
}

/// A block device exposed to hosts. Sizes are in KiB.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Volume {
    /// Array identifier.
    pub id: u64,
    /// Globally unique volume name.
    pub name: String,
    /// Provisioned size in KiB.
    pub size: u64,
    /// Enclosing volume group.
    pub volume_group: ObjectRef,
    /// Lifecycle state, when reported.
    #[serde(default)]
    pub state: Option<String>,
}

/// Dedup and quota container holding exactly one managed volume.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct VolumeGroup {
    /// Array identifier.
    pub id: u64,
    /// Group name.
    pub name: String,
    /// Quota in KiB, `0` meaning unlimited.
    #[serde(default)]
    pub quota: u64,
    /// Whether volumes in the group are deduplicated.
    pub is_dedup: bool,
}

/// Point-in-time snapshot of a volume group, or an exposable view of one.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Snapshot {
    /// Array identifier.
    pub id: u64,
    /// Name given at creation.
    pub short_name: String,
    /// Volume group or snapshot the snapshot was taken from.
    pub source: ObjectRef,
    /// Retention policy governing the snapshot.
    pub retention_policy: ObjectRef,
    /// Whether the snapshot can be mapped to hosts.
    #[serde(default)]
    pub is_exposable: bool,
    /// Whether the retention policy may delete the snapshot.
    #[serde(default)]
    pub is_auto_deleteable: bool,
    /// Lifecycle state, when reported.
    #[serde(default)]
    pub state: Option<String>,
}

/// Per-volume object backing an exposed view.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct VolSnap {
    /// Array identifier.
    pub id: u64,
    /// View this object belongs to.
    pub snapshot: ObjectRef,
}

/// An initiator (compute node).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Host {
    /// Array identifier.
    pub id: u64,
    /// Host name derived from the connector.
    pub name: String,
    /// Operating system type.
    #[serde(rename = "type", default)]
    pub host_type: Option<String>,
}

/// iSCSI initiator registered for a host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct HostIqn {
    /// Array identifier.
    pub id: u64,
    /// Initiator qualified name.
    pub iqn: String,
    /// Owning host.
    pub host: ObjectRef,
}

/// LUN assignment binding a volume (or view) to a host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Mapping {
    /// Array identifier.
    pub id: u64,
    /// Mapped volume, view, or volsnap.
    pub volume: ObjectRef,
    /// Host receiving the mapping.
    pub host: ObjectRef,
    /// LUN assigned by the array.
    pub lun: u32,
}

/// Named snapshot-retention rule.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct RetentionPolicy {
    /// Array identifier.
    pub id: u64,
    /// Policy name.
    pub name: String,
}

/// Array-wide capacity counters, all in KiB.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SystemCapacity {
    /// Array identifier.
    pub id: u64,
    /// Free physical capacity.
    pub free: u64,
    /// Total physical capacity.
    pub total: u64,
    /// Provisioned capacity including snapshots.
    #[serde(default)]
    pub provisioned: u64,
    /// Provisioned capacity of volumes.
    #[serde(default)]
    pub provisioned_volumes: u64,
}

/// Array identity and software state.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SystemState {
    /// Array identifier.
    pub id: u64,
    /// Version of the REST API served by the array.
    pub rest_api_version: String,
}

macro_rules! resource {
    ($ty:ty, $collection:literal, $kind:literal) => {
        impl Resource for $ty {
            const COLLECTION: &'static str = $collection;
            const KIND: &'static str = $kind;

            fn id(&self) -> u64 {
                self.id
            }
        }
    };
}

resource!(Volume, "volumes", "volume");
resource!(VolumeGroup, "volume_groups", "volume group");
resource!(Snapshot, "snapshots", "snapshot");
resource!(VolSnap, "volsnaps", "volsnap");
resource!(Host, "hosts", "host");
resource!(HostIqn, "host_iqns", "host iqn");
resource!(Mapping, "mappings", "mapping");
resource!(RetentionPolicy, "retention_policies", "retention policy");
resource!(SystemCapacity, "system/capacity", "system capacity");
resource!(SystemState, "system/state", "system state");

impl Savable for Volume {
    fn changes(&self) -> Value {
        json!({ "name": self.name, "size": self.size })
    }
}

impl Savable for VolumeGroup {
    fn changes(&self) -> Value {
        json!({ "name": self.name, "quota": self.quota })
    }
}

impl Stateful for Volume {
    fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }
}

impl Stateful for Snapshot {
    fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }
}

/// Draft for a new volume group.
#[derive(Clone, Debug, Serialize)]
pub struct NewVolumeGroup {
    /// Group name.
    pub name: String,
    /// Quota in KiB, `0` meaning unlimited.
    pub quota: u64,
    /// Whether volumes in the group are deduplicated.
    pub is_dedup: bool,
}

/// Draft for a new volume.
#[derive(Clone, Debug, Serialize)]
pub struct NewVolume {
    /// Volume name.
    pub name: String,
    /// Size in KiB.
    pub size: u64,
    /// Enclosing group.
    pub volume_group: ObjectRef,
}

/// Draft for a new snapshot or view.
#[derive(Clone, Debug, Serialize)]
pub struct NewSnapshot {
    /// Snapshot name.
    pub short_name: String,
    /// Volume group or snapshot to take the snapshot from.
    pub source: ObjectRef,
    /// Retention policy applied to the snapshot.
    pub retention_policy: ObjectRef,
    /// Create an exposable view instead of a plain snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_exposable: Option<bool>,
    /// Allow the retention policy to delete the snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_auto_deleteable: Option<bool>,
}

/// Draft for a new host.
#[derive(Clone, Debug, Serialize)]
pub struct NewHost {
    /// Host name.
    pub name: String,
    /// Operating system type.
    #[serde(rename = "type")]
    pub host_type: String,
}

/// Draft registering an iSCSI initiator for a host.
#[derive(Clone, Debug, Serialize)]
pub struct NewHostIqn {
    /// Initiator qualified name.
    pub iqn: String,
    /// Owning host.
    pub host: ObjectRef,
}

/// Draft for a new mapping.
#[derive(Clone, Debug, Serialize)]
pub struct NewMapping {
    /// Volume or view to expose.
    pub volume: ObjectRef,
    /// Host receiving the mapping.
    pub host: ObjectRef,
}

impl Draft for NewVolumeGroup {
    type Output = VolumeGroup;
}

impl Draft for NewVolume {
    type Output = Volume;
}

impl Draft for NewSnapshot {
    type Output = Snapshot;
}

impl Draft for NewHost {
    type Output = Host;
}

impl Draft for NewHostIqn {
    type Output = HostIqn;
}

impl Draft for NewMapping {
    type Output = Mapping;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ref_serialises_as_ref_object() {
        let reference = ObjectRef::new("volume_groups", 12);
        let json = serde_json::to_value(&reference).unwrap_or_else(|err| panic!("serialise: {err}"));
        assert_eq!(json, json!({"ref": "/volume_groups/12"}));
    }

    #[test]
    fn object_ref_knows_its_collection() {
        assert!(ObjectRef::new("system/capacity", 1).is_in("system/capacity"));
        assert!(ObjectRef::new("snapshots", 4).is_in("snapshots"));
        assert!(!ObjectRef::new("snapshots", 4).is_in("volumes"));
    }

    #[test]
    fn snapshot_draft_omits_unset_flags() {
        let draft = NewSnapshot {
            short_name: String::from("cview-1"),
            source: ObjectRef::new("snapshots", 3),
            retention_policy: ObjectRef::new("retention_policies", 1),
            is_exposable: Some(true),
            is_auto_deleteable: None,
        };
        let json = serde_json::to_value(&draft).unwrap_or_else(|err| panic!("serialise: {err}"));
        assert_eq!(json["is_exposable"], json!(true));
        assert!(json.get("is_auto_deleteable").is_none());
        assert_eq!(json["source"], json!({"ref": "/snapshots/3"}));
    }

    #[test]
    fn volume_decodes_from_wire_shape() {
        let volume: Volume = serde_json::from_value(json!({
            "id": 7,
            "name": "cv-abc",
            "size": 1_048_576,
            "volume_group": {"ref": "/volume_groups/3"},
            "is_dedup": true
        }))
        .unwrap_or_else(|err| panic!("decode: {err}"));
        assert_eq!(volume.object_ref().path(), "/volumes/7");
        assert_eq!(volume.volume_group, ObjectRef::new("volume_groups", 3));
        assert_eq!(volume.state, None);
    }
}
