//! Driver-level error type observed by the orchestrator.
//!
//! Low level failures keep their structure all the way up: a failed
//! lifecycle operation is reported as [`DriverError::Operation`] naming the
//! operation and the array entity, with the original failure as its source.
//! Compensation logic and callers branch on [`ErrorKind`] rather than on
//! message text.

use std::fmt;

use thiserror::Error;

use crate::array::ArrayError;
use crate::config::ConfigError;
use crate::connector::ConnectorError;

/// Orchestrator-facing operations, used to label failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Create a volume and its group.
    CreateVolume,
    /// Delete a volume and its group.
    DeleteVolume,
    /// Snapshot a volume group.
    CreateSnapshot,
    /// Delete a snapshot.
    DeleteSnapshot,
    /// Restore a snapshot into a new volume.
    CreateVolumeFromSnapshot,
    /// Clone a detached volume.
    CreateClonedVolume,
    /// Grow a volume.
    ExtendVolume,
    /// Rename a migrated volume onto the original identifiers.
    AfterVolumeCopy,
    /// Map a volume or view to a host.
    InitializeConnection,
    /// Unmap a volume or view from a host.
    TerminateConnection,
    /// Refresh capacity statistics.
    UpdateVolumeStats,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CreateVolume => "create volume",
            Self::DeleteVolume => "delete volume",
            Self::CreateSnapshot => "create snapshot",
            Self::DeleteSnapshot => "delete snapshot",
            Self::CreateVolumeFromSnapshot => "create volume from snapshot",
            Self::CreateClonedVolume => "create cloned volume",
            Self::ExtendVolume => "extend volume",
            Self::AfterVolumeCopy => "finish volume migration",
            Self::InitializeConnection => "initialize connection",
            Self::TerminateConnection => "terminate connection",
            Self::UpdateVolumeStats => "update volume stats",
        };
        f.write_str(label)
    }
}

/// Coarse classification of a [`DriverError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Driver could not be initialised.
    Setup,
    /// A lifecycle operation failed after compensation.
    Operation,
    /// A manage-existing reference was unusable.
    InvalidReference,
    /// The request is not allowed in the current array state.
    InvalidOperation,
    /// A required array entity was absent.
    NotFound,
    /// A bounded wait ran out of attempts.
    Timeout,
    /// The array rejected or failed a request.
    Array,
    /// The host-side attach or copy collaborator failed.
    Connector,
}

/// Errors raised by the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Missing dependency, bad configuration, or incompatible array.
    #[error("driver setup failed: {reason}")]
    Setup {
        /// Description of what is wrong.
        reason: String,
    },
    /// A lifecycle operation failed.
    #[error("{operation} failed for {entity}: {source}")]
    Operation {
        /// Operation that failed.
        operation: Operation,
        /// Array name of the entity being worked on.
        entity: String,
        /// Original failure.
        #[source]
        source: Box<DriverError>,
    },
    /// A manage-existing request names an unusable volume.
    #[error("invalid existing volume reference {source_name}: {reason}")]
    InvalidReference {
        /// Source name supplied by the caller.
        source_name: String,
        /// Why the reference was rejected.
        reason: String,
    },
    /// The request is not allowed for the entity's current state.
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// Why the request was rejected.
        reason: String,
    },
    /// A required entity does not exist on the array.
    #[error("{kind} {name} not found on the array")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// Name or reference that was looked up.
        name: String,
    },
    /// A polled entity never reached the wanted state.
    #[error("timed out waiting for {entity} to reach state {state}")]
    Timeout {
        /// Reference of the polled entity.
        entity: String,
        /// State that was awaited.
        state: String,
    },
    /// The array failed a request.
    #[error(transparent)]
    Array(#[from] ArrayError),
    /// The host-side collaborator failed.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl DriverError {
    /// Wraps `source` as a failure of `operation` on `entity`.
    #[must_use]
    pub fn operation(operation: Operation, entity: impl Into<String>, source: Self) -> Self {
        Self::Operation {
            operation,
            entity: entity.into(),
            source: Box::new(source),
        }
    }

    /// Builds a [`DriverError::NotFound`].
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup { .. } => ErrorKind::Setup,
            Self::Operation { .. } => ErrorKind::Operation,
            Self::InvalidReference { .. } => ErrorKind::InvalidReference,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Array(_) => ErrorKind::Array,
            Self::Connector(_) => ErrorKind::Connector,
        }
    }

    /// Returns the classification of the innermost wrapped failure.
    #[must_use]
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            Self::Operation { source, .. } => source.root_kind(),
            other => other.kind(),
        }
    }
}

impl From<ConfigError> for DriverError {
    fn from(value: ConfigError) -> Self {
        Self::Setup {
            reason: value.to_string(),
        }
    }
}
