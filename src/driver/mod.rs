//! Volume lifecycle driver for K2 arrays.
//!
//! [`K2Driver`] maps orchestrator requests onto sequences of repository
//! calls. Each multi-step operation is a saga: forward steps run in order and
//! a failure triggers best-effort compensation of the steps already taken
//! before the error is returned wrapped as [`DriverError::Operation`].

use semver::Version;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::array::{HttpTransport, Transport};
use crate::config::K2Config;
use crate::error::DriverError;
use crate::naming;
use crate::repository::{
    ArrayClient, Filters, ObjectRef, Resource, RetentionPolicy, Snapshot, SystemState, Volume,
    VolumeGroup,
};

mod connection;
mod copy;
mod manage;
mod stats;
mod volume;
mod wait;

pub use stats::{CapacityStats, VolumeStats};
pub use wait::PollSettings;

/// Oldest REST API version the driver can work with.
pub const MIN_REST_API_VERSION: &str = "2.2.0";

/// Name reported when no backend name is configured.
pub const DRIVER_NAME: &str = "KaminarioK2Driver";

/// Vendor reported in volume stats.
pub const VENDOR_NAME: &str = "Kaminario";

/// Driver version reported in volume stats.
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Something that can be mapped to a host: a volume or an exposable view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MappingTarget {
    /// A managed volume.
    Volume(Volume),
    /// An exposable snapshot view.
    View(Snapshot),
}

impl MappingTarget {
    /// Reference used when creating or searching mappings.
    #[must_use]
    pub fn object_ref(&self) -> ObjectRef {
        match self {
            Self::Volume(volume) => volume.object_ref(),
            Self::View(view) => view.object_ref(),
        }
    }

    /// Array name of the target.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Volume(volume) => &volume.name,
            Self::View(view) => &view.short_name,
        }
    }
}

/// A connection target that is either already fetched from the array or
/// still identified only by its orchestrator volume id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntityRef {
    /// Orchestrator volume id, looked up by derived name.
    Unresolved(String),
    /// Array object fetched earlier in the same operation.
    Resolved(MappingTarget),
}

impl EntityRef {
    /// Target for the orchestrator volume `volume_id`.
    #[must_use]
    pub fn volume_id(volume_id: impl Into<String>) -> Self {
        Self::Unresolved(volume_id.into())
    }

    /// Human readable name used in logs and errors.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Unresolved(id) => naming::volume_name(id),
            Self::Resolved(target) => target.name().to_owned(),
        }
    }
}

/// Volume driver bound to one array session.
#[derive(Debug)]
pub struct K2Driver<T> {
    client: ArrayClient<T>,
    config: K2Config,
    stats: RwLock<Option<CapacityStats>>,
    poll: PollSettings,
}

impl K2Driver<HttpTransport> {
    /// Validates `config` and opens an HTTPS session to the array.
    ///
    /// No request is sent; call [`K2Driver::check_for_setup_error`] to verify
    /// the array is reachable and compatible.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Setup`] when required settings are missing or
    /// the HTTP client cannot be built.
    pub fn connect(config: K2Config) -> Result<Self, DriverError> {
        config.validate()?;
        if !config.validates_tls() && !config.suppresses_ssl_warnings() {
            warn!(
                san_ip = %config.san_ip,
                "TLS certificate validation is disabled for the array endpoint"
            );
        }
        let transport = HttpTransport::new(&config).map_err(|err| DriverError::Setup {
            reason: err.to_string(),
        })?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> K2Driver<T> {
    /// Builds a driver over an arbitrary transport.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Setup`] when required settings are missing.
    pub fn with_transport(config: K2Config, transport: T) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            client: ArrayClient::new(transport),
            config,
            stats: RwLock::new(None),
            poll: PollSettings::default(),
        })
    }

    /// Replaces the polling cadence used by [`K2Driver::wait_for_state`].
    #[must_use]
    pub const fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Returns the entity repository.
    #[must_use]
    pub const fn client(&self) -> &ArrayClient<T> {
        &self.client
    }

    /// Returns the driver configuration.
    #[must_use]
    pub const fn config(&self) -> &K2Config {
        &self.config
    }

    /// Verifies the array answers and runs a supported REST API version.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Setup`] when the version cannot be read or is
    /// older than [`MIN_REST_API_VERSION`].
    #[tracing::instrument(skip(self))]
    pub async fn check_for_setup_error(&self) -> Result<(), DriverError> {
        let state = self
            .client
            .find::<SystemState>(Filters::new())
            .await
            .map_err(|err| DriverError::Setup {
                reason: format!("rest api version search failed: {err}"),
            })?
            .ok_or_else(|| DriverError::Setup {
                reason: String::from("rest api version search failed"),
            })?;

        let found = parse_lenient_version(&state.rest_api_version)?;
        let floor = parse_lenient_version(MIN_REST_API_VERSION)?;
        if found < floor {
            error!(version = %found, "array REST API is too old");
            return Err(DriverError::Setup {
                reason: format!(
                    "rest api version should be >= {MIN_REST_API_VERSION}, array reports {}",
                    state.rest_api_version
                ),
            });
        }
        info!(version = %found, "array REST API version is supported");
        Ok(())
    }

    /// Creating an export needs no array work.
    pub const fn create_export(&self) {}

    /// Ensuring an export needs no array work.
    pub const fn ensure_export(&self) {}

    /// Removing an export needs no array work.
    pub const fn remove_export(&self) {}

    async fn find_by_name<R: Resource>(
        &self,
        field: &str,
        name: &str,
    ) -> Result<Option<R>, DriverError> {
        Ok(self
            .client
            .find::<R>(Filters::new().field(field, name))
            .await?)
    }

    async fn find_volume(&self, name: &str) -> Result<Option<Volume>, DriverError> {
        self.find_by_name::<Volume>("name", name).await
    }

    async fn require_volume(&self, name: &str) -> Result<Volume, DriverError> {
        self.find_volume(name)
            .await?
            .ok_or_else(|| DriverError::not_found(Volume::KIND, name))
    }

    async fn find_group(&self, name: &str) -> Result<Option<VolumeGroup>, DriverError> {
        self.find_by_name::<VolumeGroup>("name", name).await
    }

    async fn require_group(&self, name: &str) -> Result<VolumeGroup, DriverError> {
        self.find_group(name)
            .await?
            .ok_or_else(|| DriverError::not_found(VolumeGroup::KIND, name))
    }

    async fn find_snapshot(&self, short_name: &str) -> Result<Option<Snapshot>, DriverError> {
        self.find_by_name::<Snapshot>("short_name", short_name).await
    }

    /// Resolves the retention policy applied to snapshots and views.
    async fn retention_policy(&self) -> Result<RetentionPolicy, DriverError> {
        self.find_by_name::<RetentionPolicy>("name", naming::RETENTION_POLICY_NAME)
            .await?
            .ok_or_else(|| {
                error!("retention policy search failed");
                DriverError::not_found(RetentionPolicy::KIND, naming::RETENTION_POLICY_NAME)
            })
    }

    async fn resolve(&self, target: EntityRef) -> Result<MappingTarget, DriverError> {
        match target {
            EntityRef::Resolved(resolved) => Ok(resolved),
            EntityRef::Unresolved(id) => self
                .require_volume(&naming::volume_name(&id))
                .await
                .map(MappingTarget::Volume),
        }
    }
}

/// Parses a version string, padding missing minor or patch parts with 0.
fn parse_lenient_version(raw: &str) -> Result<Version, DriverError> {
    let trimmed = raw.trim();
    let dots = trimmed.matches('.').count();
    let padded = match dots {
        0 => format!("{trimmed}.0.0"),
        1 => format!("{trimmed}.0"),
        _ => trimmed.to_owned(),
    };
    Version::parse(&padded).map_err(|err| DriverError::Setup {
        reason: format!("unparseable rest api version {trimmed:?}: {err}"),
    })
}
