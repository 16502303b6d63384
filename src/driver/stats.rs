//! Capacity reporting.

use serde::Serialize;
use tracing::debug;

use crate::array::Transport;
use crate::error::{DriverError, Operation};
use crate::repository::{Filters, Resource, SystemCapacity, Volume};
use crate::volume::KIB_PER_GIB;

use super::{DRIVER_NAME, DRIVER_VERSION, K2Driver, VENDOR_NAME};

/// Capacity figures refreshed from the array.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapacityStats {
    /// Free physical capacity in GiB.
    pub free_capacity_gb: f64,
    /// Total physical capacity in GiB.
    pub total_capacity_gb: f64,
    /// Capacity provisioned to volumes in GiB.
    pub provisioned_capacity_gb: f64,
    /// Oversubscription ratio the scheduler may use.
    pub max_oversubscription_ratio: f64,
    /// Volumes on the array, not counting the array's own system volume.
    pub total_volumes: u64,
    /// Thin provisioning is always available.
    pub thin_provisioning_support: bool,
    /// Thick provisioning is never available.
    pub thick_provisioning_support: bool,
    /// Block copies skip zero blocks.
    pub sparse_copy_volume: bool,
    /// QoS specs are not supported.
    #[serde(rename = "QoS_support")]
    pub qos_support: bool,
    /// Provisioning types a volume type may select.
    #[serde(rename = "kaminario:thin_prov_type")]
    pub thin_prov_type: String,
}

/// Stats reported to the orchestrator: backend identity plus the last
/// refreshed capacity figures.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VolumeStats {
    /// Backend name, from configuration or the driver name.
    pub volume_backend_name: String,
    /// Array vendor.
    pub vendor_name: String,
    /// Driver version.
    pub driver_version: String,
    /// Storage protocol used to attach volumes.
    pub storage_protocol: String,
    /// Capacity figures, absent until the first refresh.
    #[serde(flatten)]
    pub capacity: Option<CapacityStats>,
}

impl<T: Transport> K2Driver<T> {
    /// Returns stats for the orchestrator, refreshing them first when
    /// `refresh` is set.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when a refresh fails.
    #[tracing::instrument(skip(self))]
    pub async fn get_volume_stats(&self, refresh: bool) -> Result<VolumeStats, DriverError> {
        if refresh {
            self.update_volume_stats().await?;
        }
        let capacity = self.stats.read().await.clone();
        Ok(VolumeStats {
            volume_backend_name: self
                .config
                .volume_backend_name
                .clone()
                .unwrap_or_else(|| DRIVER_NAME.to_owned()),
            vendor_name: VENDOR_NAME.to_owned(),
            driver_version: DRIVER_VERSION.to_owned(),
            storage_protocol: self.config.storage_protocol.clone(),
            capacity,
        })
    }

    /// Reads capacity figures from the array and caches them.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when the capacity singleton or the
    /// volume count cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn update_volume_stats(&self) -> Result<CapacityStats, DriverError> {
        let refreshed = self.read_capacity().await.map_err(|err| {
            DriverError::operation(Operation::UpdateVolumeStats, SystemCapacity::COLLECTION, err)
        })?;
        *self.stats.write().await = Some(refreshed.clone());
        Ok(refreshed)
    }

    async fn read_capacity(&self) -> Result<CapacityStats, DriverError> {
        debug!("searching system capacity");
        let capacity = self
            .client
            .find::<SystemCapacity>(Filters::new())
            .await?
            .ok_or_else(|| DriverError::not_found(SystemCapacity::KIND, SystemCapacity::COLLECTION))?;

        debug!("counting volumes");
        let total_volumes = self
            .client
            .search::<Volume>(Filters::new())
            .await?
            .total
            .saturating_sub(1);

        Ok(CapacityStats {
            free_capacity_gb: kib_to_gib(capacity.free),
            total_capacity_gb: kib_to_gib(capacity.total),
            provisioned_capacity_gb: kib_to_gib(capacity.provisioned_volumes),
            max_oversubscription_ratio: self.oversubscription_ratio(&capacity),
            total_volumes,
            thin_provisioning_support: true,
            thick_provisioning_support: false,
            sparse_copy_volume: true,
            qos_support: false,
            thin_prov_type: String::from("dedup/nodedup"),
        })
    }

    /// Live ratio of provisioned to allocated capacity when auto-calculation
    /// is enabled and both figures are non-zero, else the configured ratio.
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "ratio of KiB counters; precision loss is irrelevant for scheduling"
    )]
    fn oversubscription_ratio(&self, capacity: &SystemCapacity) -> f64 {
        let allocated = capacity.total.saturating_sub(capacity.free);
        if self.config.auto_calculates_ratio()
            && capacity.provisioned != 0
            && allocated != 0
        {
            capacity.provisioned_volumes as f64 / allocated as f64
        } else {
            self.config.max_over_subscription_ratio
        }
    }
}

#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    reason = "capacity is reported in fractional GiB"
)]
fn kib_to_gib(kib: u64) -> f64 {
    kib as f64 / KIB_PER_GIB as f64
}
