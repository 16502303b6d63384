//! Host-side collaborator used by the copy sagas.
//!
//! Attaching a mapped LUN to the local host and copying blocks between
//! attached devices are owned by the orchestrator. The driver only calls
//! through [`HostConnector`].

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::array::BackendFuture;

/// Properties of the host requesting a connection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Connector {
    /// Host name reported by the orchestrator; used to derive the array
    /// host name.
    pub host: String,
    /// iSCSI initiator name of the host, when known.
    pub initiator: Option<String>,
}

impl Connector {
    /// Creates connector properties for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            initiator: None,
        }
    }

    /// Sets the iSCSI initiator name.
    #[must_use]
    pub fn initiator(mut self, value: impl Into<String>) -> Self {
        self.initiator = Some(value.into());
        self
    }
}

/// Connection details returned once a volume is mapped to a host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionInfo {
    /// Array name of the mapped volume or view.
    pub target_name: String,
    /// LUN the host sees the target at.
    pub lun: u32,
    /// Array host name the target is mapped to.
    pub host_name: String,
}

/// A device attached to the local host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttachInfo {
    /// Local block device path.
    pub device_path: Utf8PathBuf,
    /// Connection the device was attached from.
    pub connection: ConnectionInfo,
}

/// Parameters of a block copy between two attached devices.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopyRequest {
    /// Device to read from.
    pub source_path: Utf8PathBuf,
    /// Device to write to.
    pub dest_path: Utf8PathBuf,
    /// Number of MiB to copy.
    pub size_mib: u64,
    /// Block size understood by the copy primitive, for example `1M`.
    pub block_size: String,
    /// Skip writing zero blocks.
    pub sparse: bool,
}

/// Failure reported by the host-side collaborator.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("host {action} failed: {message}")]
pub struct ConnectorError {
    /// Step that failed, for example `copy`.
    pub action: String,
    /// Collaborator supplied detail.
    pub message: String,
}

impl ConnectorError {
    /// Creates an error for `action`.
    #[must_use]
    pub fn new(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Attach, detach, and copy primitives of the local host.
pub trait HostConnector: Send + Sync {
    /// Returns the properties identifying this host to the array.
    fn properties(&self) -> Connector;

    /// Attaches the mapped target described by `connection`.
    fn connect_device<'a>(
        &'a self,
        connection: &'a ConnectionInfo,
    ) -> BackendFuture<'a, AttachInfo, ConnectorError>;

    /// Detaches a previously attached device.
    fn disconnect_volume<'a>(
        &'a self,
        attach: &'a AttachInfo,
    ) -> BackendFuture<'a, (), ConnectorError>;

    /// Copies blocks between two attached devices.
    fn copy_blocks<'a>(&'a self, request: &'a CopyRequest)
    -> BackendFuture<'a, (), ConnectorError>;
}
