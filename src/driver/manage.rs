//! Adoption of volumes created outside the driver.

use tracing::{debug, error, warn};

use crate::array::Transport;
use crate::error::DriverError;
use crate::naming;
use crate::repository::{Filters, Mapping, ObjectRef, Resource, VolumeGroup};
use crate::volume::{ExistingRef, KIB_PER_GIB, VolumeSpec};

use super::K2Driver;

/// Volume group renamed during adoption, identified by reference so the
/// compensation never touches another group that shares the derived name.
#[derive(Debug)]
struct RenamedGroup {
    reference: ObjectRef,
    original_name: String,
}

impl<T: Transport> K2Driver<T> {
    /// Brings the array volume named by `existing` under management as
    /// `volume`, renaming it and its group to the derived names.
    ///
    /// When the volume group was already renamed and a later step fails,
    /// the group gets its original name back. The volume's own rename is not
    /// reverted.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidReference`] when the volume is missing,
    /// mapped, provisioned differently from `volume`'s type, or cannot be
    /// renamed.
    #[tracing::instrument(skip_all, fields(volume = %volume.id, source = %existing.source_name))]
    pub async fn manage_existing(
        &self,
        volume: &VolumeSpec,
        existing: &ExistingRef,
    ) -> Result<(), DriverError> {
        let mut renamed = None;
        let outcome = self.adopt_volume(volume, existing, &mut renamed).await;
        let Err(err) = outcome else {
            return Ok(());
        };

        if let Some(group) = renamed {
            self.restore_group_name(group).await;
        }
        error!(source = %existing.source_name, error = %err, "managing volume failed");
        if matches!(err, DriverError::InvalidReference { .. }) {
            return Err(err);
        }
        Err(invalid(existing, &err.to_string()))
    }

    async fn adopt_volume(
        &self,
        volume: &VolumeSpec,
        existing: &ExistingRef,
        renamed: &mut Option<RenamedGroup>,
    ) -> Result<(), DriverError> {
        let source_name = &existing.source_name;
        let wanted_dedup = naming::is_dedup(volume.volume_type.as_ref());

        debug!(name = %source_name, "searching volume");
        let mut found = self.require_volume(source_name).await?;
        let mut group: VolumeGroup = self.client.get(&found.volume_group).await?;
        let mapped = !self
            .client
            .search::<Mapping>(Filters::new().refers_to("volume", &found.object_ref()))
            .await?
            .is_empty();

        if mapped {
            return Err(invalid(existing, "volume is mapped to a host"));
        }
        if group.is_dedup != wanted_dedup {
            return Err(invalid(
                existing,
                "volume provisioning type does not match the requested volume type",
            ));
        }

        let new_name = naming::volume_name(&volume.id);
        let new_group_name = naming::volume_group_name(&volume.id);
        *renamed = Some(RenamedGroup {
            reference: group.object_ref(),
            original_name: std::mem::replace(&mut group.name, new_group_name),
        });
        debug!(group = %group.name, "renaming volume group");
        self.client.save(&group).await?;

        found.name = new_name;
        debug!(volume = %found.name, "renaming volume");
        self.client.save(&found).await?;
        Ok(())
    }

    async fn restore_group_name(&self, renamed: RenamedGroup) {
        let group: VolumeGroup = match self.client.get(&renamed.reference).await {
            Ok(group) => group,
            Err(err) => {
                warn!(group = %renamed.reference, error = %err, "could not look up renamed volume group");
                return;
            }
        };
        debug!(group = %group.name, original = %renamed.original_name, "restoring volume group name");
        let restored = VolumeGroup {
            name: renamed.original_name,
            ..group
        };
        if let Err(err) = self.client.save(&restored).await {
            warn!(group = %renamed.reference, error = %err, "could not restore volume group name");
        }
    }

    /// Returns the size in GiB of the array volume named by `existing`,
    /// rounded up to a whole GiB.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidReference`] when the volume is missing
    /// or the lookup fails.
    #[tracing::instrument(skip_all, fields(source = %existing.source_name))]
    pub async fn manage_existing_get_size(&self, existing: &ExistingRef) -> Result<u64, DriverError> {
        let found = self
            .find_volume(&existing.source_name)
            .await
            .map_err(|err| invalid(existing, &err.to_string()))?
            .ok_or_else(|| invalid(existing, "unable to get size of manage volume"))?;
        Ok(found.size.div_ceil(KIB_PER_GIB))
    }
}

fn invalid(existing: &ExistingRef, reason: &str) -> DriverError {
    DriverError::InvalidReference {
        source_name: existing.source_name.clone(),
        reason: reason.to_owned(),
    }
}
