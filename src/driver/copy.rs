//! Sagas that fill a new volume by block copy: restore from snapshot and
//! clone of a detached volume.

use tracing::{debug, error, warn};

use crate::array::Transport;
use crate::connector::{AttachInfo, Connector, CopyRequest, HostConnector};
use crate::error::{DriverError, Operation};
use crate::naming;
use crate::repository::{Filters, Mapping, NewSnapshot, Resource, Snapshot, Volume};
use crate::volume::{MIB_PER_GIB, SnapshotSpec, VolumeSpec};

use super::{EntityRef, K2Driver, MappingTarget};

/// Devices attached to the local host during a copy.
#[derive(Debug, Default)]
struct Attachments {
    source: Option<AttachInfo>,
    dest: Option<AttachInfo>,
}

impl Attachments {
    /// Detaches every attached device and returns the first failure.
    ///
    /// A device that fails to detach stays recorded so a later
    /// [`Attachments::detach_quietly`] tries it again.
    async fn detach(&mut self, host: &dyn HostConnector) -> Result<(), DriverError> {
        let mut first_failure = None;
        for slot in [&mut self.source, &mut self.dest] {
            let Some(attached) = slot.take() else {
                continue;
            };
            if let Err(err) = host.disconnect_volume(&attached).await {
                warn!(device = %attached.device_path, error = %err, "could not detach device");
                *slot = Some(attached);
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
        first_failure.map_or(Ok(()), |err| Err(err.into()))
    }

    /// Detaches every attached device, logging failures.
    async fn detach_quietly(&mut self, host: &dyn HostConnector) {
        for attached in [self.source.take(), self.dest.take()].into_iter().flatten() {
            if let Err(err) = host.disconnect_volume(&attached).await {
                warn!(device = %attached.device_path, error = %err, "could not detach device");
            }
        }
    }
}

impl<T: Transport> K2Driver<T> {
    /// Creates `volume` with the content of `snapshot`.
    ///
    /// The snapshot is exposed through a temporary view which is mapped to
    /// the local host and copied block by block into the new volume. The view
    /// is deleted on success and on failure; on failure the new volume is
    /// deleted too.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] wrapping the failed step.
    #[tracing::instrument(skip_all, fields(volume = %volume.id, snapshot = %snapshot.id))]
    pub async fn create_volume_from_snapshot(
        &self,
        volume: &VolumeSpec,
        snapshot: &SnapshotSpec,
        host: &dyn HostConnector,
    ) -> Result<(), DriverError> {
        let vol_name = naming::volume_name(&volume.id);
        let wrap = |err| DriverError::operation(Operation::CreateVolumeFromSnapshot, &vol_name, err);

        let view = self.create_view(volume, snapshot).await.map_err(wrap)?;
        let source = MappingTarget::View(view.clone());
        let properties = host.properties();
        let mut attached = Attachments::default();

        let size_mib = snapshot.volume_size_gb.saturating_mul(MIB_PER_GIB);
        let copied = async {
            self.copy_to_new_volume(volume, &source, size_mib, host, &mut attached)
                .await?;
            self.client.delete(&view).await?;
            Ok::<(), DriverError>(())
        }
        .await;

        match copied {
            Ok(()) => Ok(()),
            Err(err) => {
                attached.detach_quietly(host).await;
                self.release_quietly(EntityRef::Resolved(source), &properties)
                    .await;
                self.release_quietly(EntityRef::volume_id(volume.id.clone()), &properties)
                    .await;
                if let Err(cleanup) = self.client.delete(&view).await {
                    warn!(view = %view.short_name, error = %cleanup, "could not delete view");
                }
                self.discard_volume(&volume.id).await;
                error!(volume = %vol_name, view = %view.short_name, error = %err, "copy from view failed");
                Err(wrap(err))
            }
        }
    }

    async fn create_view(
        &self,
        volume: &VolumeSpec,
        snapshot: &SnapshotSpec,
    ) -> Result<Snapshot, DriverError> {
        let snap_name = naming::snapshot_name(&snapshot.id);
        let view_name = naming::view_name(&volume.id);
        let policy = self.retention_policy().await?;

        debug!(snapshot = %snap_name, "searching snapshot");
        let source = self
            .find_snapshot(&snap_name)
            .await?
            .ok_or_else(|| DriverError::not_found(Snapshot::KIND, &snap_name))?;

        debug!(view = %view_name, snapshot = %snap_name, "creating view from snapshot");
        self.client
            .create(&NewSnapshot {
                short_name: view_name.clone(),
                source: source.object_ref(),
                retention_policy: policy.object_ref(),
                is_exposable: Some(true),
                is_auto_deleteable: None,
            })
            .await
            .map_err(|err| {
                error!(view = %view_name, snapshot = %snap_name, error = %err, "creating view failed");
                err.into()
            })
    }

    /// Creates `volume` as a block copy of the detached volume `source`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] wrapping
    /// [`DriverError::InvalidOperation`] when `source` is mapped to any host,
    /// or wrapping the failed step otherwise. Nothing is created when the
    /// source is mapped.
    #[tracing::instrument(skip_all, fields(volume = %volume.id, source = %source.id))]
    pub async fn create_cloned_volume(
        &self,
        volume: &VolumeSpec,
        source: &VolumeSpec,
        host: &dyn HostConnector,
    ) -> Result<(), DriverError> {
        let clone_name = naming::volume_name(&volume.id);
        let wrap = |err| DriverError::operation(Operation::CreateClonedVolume, &clone_name, err);

        let source_volume = self.detached_source(source).await.map_err(wrap)?;
        let origin = MappingTarget::Volume(source_volume);
        let properties = host.properties();
        let mut attached = Attachments::default();

        let size_mib = source.size_gb.saturating_mul(MIB_PER_GIB);
        let copied = self
            .copy_to_new_volume(volume, &origin, size_mib, host, &mut attached)
            .await;

        match copied {
            Ok(()) => Ok(()),
            Err(err) => {
                attached.detach_quietly(host).await;
                self.release_quietly(EntityRef::Resolved(origin), &properties)
                    .await;
                self.release_quietly(EntityRef::volume_id(volume.id.clone()), &properties)
                    .await;
                self.discard_volume(&volume.id).await;
                error!(clone = %clone_name, error = %err, "clone failed");
                Err(wrap(err))
            }
        }
    }

    async fn detached_source(&self, source: &VolumeSpec) -> Result<Volume, DriverError> {
        let src_name = naming::volume_name(&source.id);
        let found = self.require_volume(&src_name).await?;
        let mappings = self
            .client
            .search::<Mapping>(Filters::new().refers_to("volume", &found.object_ref()))
            .await?;
        if !mappings.is_empty() {
            error!(source = %src_name, "attached volumes cannot be cloned");
            return Err(DriverError::InvalidOperation {
                reason: format!(
                    "{src_name} is attached; clone a snapshot of an attached volume instead"
                ),
            });
        }
        Ok(found)
    }

    /// Attaches `source` and a freshly created `volume`, copies `size_mib`
    /// MiB between them, then detaches and unmaps both.
    async fn copy_to_new_volume(
        &self,
        volume: &VolumeSpec,
        source: &MappingTarget,
        size_mib: u64,
        host: &dyn HostConnector,
        attached: &mut Attachments,
    ) -> Result<(), DriverError> {
        let properties = host.properties();
        let source_conn = self
            .initialize_connection(EntityRef::Resolved(source.clone()), &properties)
            .await?;
        let source_device = host.connect_device(&source_conn).await?;
        let source_path = source_device.device_path.clone();
        attached.source = Some(source_device);

        self.create_volume(volume).await?;
        let dest_conn = self
            .initialize_connection(EntityRef::volume_id(volume.id.clone()), &properties)
            .await?;
        let dest_device = host.connect_device(&dest_conn).await?;
        let dest_path = dest_device.device_path.clone();
        attached.dest = Some(dest_device);

        debug!(from = %source_path, to = %dest_path, size_mib, "copying blocks");
        host.copy_blocks(&CopyRequest {
            source_path,
            dest_path,
            size_mib,
            block_size: self.config.volume_dd_blocksize.clone(),
            sparse: true,
        })
        .await?;

        attached.detach(host).await?;
        self.terminate_connection(EntityRef::volume_id(volume.id.clone()), &properties)
            .await?;
        self.terminate_connection(EntityRef::Resolved(source.clone()), &properties)
            .await?;
        Ok(())
    }

    async fn release_quietly(&self, target: EntityRef, properties: &Connector) {
        let shown = target.display_name();
        if let Err(err) = self.terminate_connection(target, properties).await {
            warn!(target = %shown, error = %err, "could not unmap target");
        }
    }

    async fn discard_volume(&self, volume_id: &str) {
        if let Err(err) = self.delete_volume(volume_id).await {
            warn!(volume = %volume_id, error = %err, "could not delete partially created volume");
        }
    }
}
