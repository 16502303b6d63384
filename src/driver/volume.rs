//! Volume, snapshot, and migration sagas.

use tracing::{debug, error, info, warn};

use crate::array::Transport;
use crate::error::{DriverError, Operation};
use crate::naming;
use crate::repository::{NewSnapshot, NewVolume, NewVolumeGroup, Resource, Volume, VolumeGroup};
use crate::volume::{KIB_PER_GIB, SnapshotSpec, VolumeSpec};

use super::K2Driver;

impl<T: Transport> K2Driver<T> {
    /// Creates the volume group and the volume for `volume`.
    ///
    /// Either both objects exist afterwards or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] wrapping the failed step.
    #[tracing::instrument(skip_all, fields(volume = %volume.id))]
    pub async fn create_volume(&self, volume: &VolumeSpec) -> Result<Volume, DriverError> {
        let vg_name = naming::volume_group_name(&volume.id);
        let vol_name = naming::volume_name(&volume.id);
        match self.create_volume_pair(volume, &vg_name, &vol_name).await {
            Ok(created) => Ok(created),
            Err(err) => {
                self.discard_group(&vg_name).await;
                error!(volume = %vol_name, error = %err, "volume creation failed");
                Err(DriverError::operation(Operation::CreateVolume, vol_name, err))
            }
        }
    }

    async fn create_volume_pair(
        &self,
        volume: &VolumeSpec,
        vg_name: &str,
        vol_name: &str,
    ) -> Result<Volume, DriverError> {
        let is_dedup = naming::is_dedup(volume.volume_type.as_ref());
        debug!(name = vg_name, dedup = is_dedup, "creating volume group with unlimited quota");
        let group = self
            .client
            .create(&NewVolumeGroup {
                name: vg_name.to_owned(),
                quota: 0,
                is_dedup,
            })
            .await?;

        debug!(name = vol_name, size_gb = volume.size_gb, group = vg_name, "creating volume");
        let created = self
            .client
            .create(&NewVolume {
                name: vol_name.to_owned(),
                size: volume.size_kib(),
                volume_group: group.object_ref(),
            })
            .await?;
        Ok(created)
    }

    async fn discard_group(&self, vg_name: &str) {
        match self.find_group(vg_name).await {
            Ok(Some(group)) => {
                debug!(name = vg_name, "deleting volume group of failed volume");
                if let Err(err) = self.client.delete(&group).await {
                    warn!(name = vg_name, error = %err, "could not delete volume group");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(name = vg_name, error = %err, "could not look up volume group"),
        }
    }

    /// Deletes the volume and its group. Absent objects are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when a lookup or deletion fails.
    #[tracing::instrument(skip_all, fields(volume = %volume_id))]
    pub async fn delete_volume(&self, volume_id: &str) -> Result<(), DriverError> {
        let vol_name = naming::volume_name(volume_id);
        self.delete_volume_pair(volume_id).await.map_err(|err| {
            error!(volume = %vol_name, error = %err, "volume deletion failed");
            DriverError::operation(Operation::DeleteVolume, vol_name.clone(), err)
        })
    }

    async fn delete_volume_pair(&self, volume_id: &str) -> Result<(), DriverError> {
        let vol_name = naming::volume_name(volume_id);
        debug!(name = %vol_name, "searching and deleting volume");
        if let Some(volume) = self.find_volume(&vol_name).await? {
            self.client.delete(&volume).await?;
        }

        let vg_name = naming::volume_group_name(volume_id);
        debug!(name = %vg_name, "searching and deleting volume group");
        if let Some(group) = self.find_group(&vg_name).await? {
            self.client.delete(&group).await?;
        }
        Ok(())
    }

    /// Grows the volume to `new_size_gb`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when the volume is missing or the
    /// array rejects the new size.
    #[tracing::instrument(skip_all, fields(volume = %volume_id, new_size_gb))]
    pub async fn extend_volume(&self, volume_id: &str, new_size_gb: u64) -> Result<(), DriverError> {
        let vol_name = naming::volume_name(volume_id);
        let outcome = async {
            let mut volume = self.require_volume(&vol_name).await?;
            volume.size = new_size_gb.saturating_mul(KIB_PER_GIB);
            debug!(name = %vol_name, size_kib = volume.size, "extending volume");
            self.client.save(&volume).await?;
            Ok::<(), DriverError>(())
        }
        .await;
        outcome.map_err(|err| {
            error!(volume = %vol_name, error = %err, "extending volume failed");
            DriverError::operation(Operation::ExtendVolume, vol_name.clone(), err)
        })
    }

    /// Snapshots the volume group of `snapshot.volume_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when the retention policy or the
    /// volume group is missing, or the array rejects the snapshot.
    #[tracing::instrument(skip_all, fields(snapshot = %snapshot.id))]
    pub async fn create_snapshot(&self, snapshot: &SnapshotSpec) -> Result<(), DriverError> {
        let snap_name = naming::snapshot_name(&snapshot.id);
        let vg_name = naming::volume_group_name(&snapshot.volume_id);
        let outcome = async {
            let policy = self.retention_policy().await?;
            debug!(name = %vg_name, "searching volume group");
            let group = self.require_group(&vg_name).await?;
            debug!(snapshot = %snap_name, group = %vg_name, "creating snapshot");
            self.client
                .create(&NewSnapshot {
                    short_name: snap_name.clone(),
                    source: group.object_ref(),
                    retention_policy: policy.object_ref(),
                    is_exposable: Some(false),
                    is_auto_deleteable: Some(false),
                })
                .await?;
            Ok::<(), DriverError>(())
        }
        .await;
        outcome.map_err(|err| {
            error!(snapshot = %snap_name, error = %err, "snapshot creation failed");
            DriverError::operation(Operation::CreateSnapshot, snap_name.clone(), err)
        })
    }

    /// Deletes the snapshot. An absent snapshot is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when the lookup or deletion fails.
    #[tracing::instrument(skip_all, fields(snapshot = %snapshot_id))]
    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), DriverError> {
        let snap_name = naming::snapshot_name(snapshot_id);
        let outcome = async {
            debug!(name = %snap_name, "searching and deleting snapshot");
            if let Some(found) = self.find_snapshot(&snap_name).await? {
                self.client.delete(&found).await?;
            }
            Ok::<(), DriverError>(())
        }
        .await;
        outcome.map_err(|err| {
            error!(snapshot = %snap_name, error = %err, "snapshot deletion failed");
            DriverError::operation(Operation::DeleteSnapshot, snap_name.clone(), err)
        })
    }

    /// Finishes a migration: deletes `old_id`'s volume pair and renames the
    /// pair of `new_id` onto the old names.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when the deletion fails or the new
    /// pair is missing.
    #[tracing::instrument(skip_all, fields(old = %old_id, new = %new_id))]
    pub async fn after_volume_copy(&self, old_id: &str, new_id: &str) -> Result<(), DriverError> {
        let vol_name_new = naming::volume_name(new_id);
        let outcome = async {
            self.delete_volume_pair(old_id).await?;

            let mut group: VolumeGroup = self
                .require_group(&naming::volume_group_name(new_id))
                .await?;
            group.name = naming::volume_group_name(old_id);
            self.client.save(&group).await?;

            let mut volume = self.require_volume(&vol_name_new).await?;
            volume.name = naming::volume_name(old_id);
            self.client.save(&volume).await?;
            info!(volume = %volume.name, "migrated volume took over original names");
            Ok::<(), DriverError>(())
        }
        .await;
        outcome.map_err(|err| {
            DriverError::operation(Operation::AfterVolumeCopy, vol_name_new.clone(), err)
        })
    }
}
