//! Session and volume lifecycle manager for Kaminario K2 all-flash arrays.
//!
//! The crate is layered leaves first: a serialised, retry-aware
//! [`array::ArraySession`] over the REST endpoint, a typed entity
//! [`repository`] on top of it, pure [`naming`] rules, and the
//! [`driver::K2Driver`] sagas that create, clone, snapshot, adopt, and map
//! volumes with compensation on partial failure.

pub mod array;
pub mod config;
pub mod connector;
pub mod driver;
pub mod error;
pub mod naming;
pub mod repository;
pub mod test_support;
pub mod volume;

pub use array::{ArrayError, ArraySession, HttpTransport, MAX_ATTEMPTS, Transport};
pub use config::{ConfigError, K2Config};
pub use connector::{AttachInfo, ConnectionInfo, Connector, ConnectorError, CopyRequest, HostConnector};
pub use driver::{CapacityStats, EntityRef, K2Driver, MappingTarget, PollSettings, VolumeStats};
pub use error::{DriverError, ErrorKind, Operation};
pub use repository::{ArrayClient, Filters, ResultSet};
pub use volume::{ExistingRef, SnapshotSpec, VolumeSpec, VolumeType};
