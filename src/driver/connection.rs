//! Host and mapping management.

use tracing::{debug, error, warn};

use crate::array::Transport;
use crate::connector::{ConnectionInfo, Connector};
use crate::error::{DriverError, Operation};
use crate::naming;
use crate::repository::{
    Filters, Host, Mapping, NewHost, NewHostIqn, NewMapping, Resource, Snapshot, VolSnap,
};

use super::{EntityRef, K2Driver, MappingTarget};

/// Operating system type registered for hosts the driver creates.
pub const HOST_TYPE: &str = "Linux";

impl<T: Transport> K2Driver<T> {
    /// Maps `target` to the connector's host and returns the connection
    /// details the host needs to attach it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when the target is missing or the
    /// mapping cannot be created.
    #[tracing::instrument(skip_all, fields(target = %target.display_name(), host = %connector.host))]
    pub async fn initialize_connection(
        &self,
        target: EntityRef,
        connector: &Connector,
    ) -> Result<ConnectionInfo, DriverError> {
        let shown = target.display_name();
        let (mapped, lun) = self
            .map_to_host(target, connector)
            .await
            .map_err(|err| DriverError::operation(Operation::InitializeConnection, shown, err))?;
        Ok(ConnectionInfo {
            target_name: mapped.name().to_owned(),
            lun,
            host_name: naming::host_name(&connector.host),
        })
    }

    /// Maps `target` to the connector's host, creating the host when needed,
    /// and returns the assigned LUN.
    ///
    /// A host created by this call is deleted again when the mapping fails.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when the target is missing or the
    /// mapping cannot be created.
    #[tracing::instrument(skip_all, fields(target = %target.display_name(), host = %connector.host))]
    pub async fn k2_initialize_connection(
        &self,
        target: EntityRef,
        connector: &Connector,
    ) -> Result<u32, DriverError> {
        let shown = target.display_name();
        self.map_to_host(target, connector)
            .await
            .map(|(_, lun)| lun)
            .map_err(|err| DriverError::operation(Operation::InitializeConnection, shown, err))
    }

    async fn map_to_host(
        &self,
        target: EntityRef,
        connector: &Connector,
    ) -> Result<(MappingTarget, u32), DriverError> {
        let resolved = self.resolve(target).await?;
        let (host, created) = self.host_for(connector).await?;

        debug!(volume = resolved.name(), host = %host.name, "mapping volume to host");
        let mapping = match self
            .client
            .create(&NewMapping {
                volume: resolved.object_ref(),
                host: host.object_ref(),
            })
            .await
        {
            Ok(mapping) => mapping,
            Err(err) => {
                if created {
                    self.discard_host(&host.name).await;
                }
                error!(volume = resolved.name(), host = %host.name, error = %err, "unable to map volume to host");
                return Err(err.into());
            }
        };

        let lun = match &resolved {
            MappingTarget::Volume(_) => mapping.lun,
            MappingTarget::View(view) => self.view_lun(view, &host, &mapping).await?,
        };
        Ok((resolved, lun))
    }

    /// Returns the host for `connector`, creating it when absent. The flag is
    /// true when the host was created by this call.
    async fn host_for(&self, connector: &Connector) -> Result<(Host, bool), DriverError> {
        let host_name = naming::host_name(&connector.host);
        if let Some(existing) = self.find_by_name::<Host>("name", &host_name).await? {
            return Ok((existing, false));
        }

        debug!(host = %host_name, "creating host");
        let host = self
            .client
            .create(&NewHost {
                name: host_name.clone(),
                host_type: HOST_TYPE.to_owned(),
            })
            .await?;

        if let Some(iqn) = &connector.initiator {
            debug!(host = %host_name, %iqn, "registering host initiator");
            let registered = self
                .client
                .create(&NewHostIqn {
                    iqn: iqn.clone(),
                    host: host.object_ref(),
                })
                .await;
            if let Err(err) = registered {
                self.discard_host(&host_name).await;
                return Err(err.into());
            }
        }
        Ok((host, true))
    }

    /// LUN of a view mapping, read through the view's volsnap object.
    async fn view_lun(
        &self,
        view: &Snapshot,
        host: &Host,
        created: &Mapping,
    ) -> Result<u32, DriverError> {
        debug!(view = %view.short_name, "searching volsnaps");
        let Some(volsnap) = self
            .client
            .find::<VolSnap>(Filters::new().refers_to("snapshot", &view.object_ref()))
            .await?
        else {
            return Ok(created.lun);
        };

        debug!(volsnap = volsnap.id, "searching mapping of volsnap");
        let mapping = self
            .client
            .find::<Mapping>(
                Filters::new()
                    .refers_to("volume", &volsnap.object_ref())
                    .refers_to("host", &host.object_ref()),
            )
            .await?;
        Ok(mapping.map_or(created.lun, |found| found.lun))
    }

    /// Removes the mapping between `target` and the connector's host, then
    /// deletes the host once nothing else is mapped to it.
    ///
    /// An absent host only logs a warning. An absent volume skips the mapping
    /// deletion, but the host is still deleted when it has no mappings left.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when a lookup or deletion fails.
    #[tracing::instrument(skip_all, fields(target = %target.display_name(), host = %connector.host))]
    pub async fn terminate_connection(
        &self,
        target: EntityRef,
        connector: &Connector,
    ) -> Result<(), DriverError> {
        let shown = target.display_name();
        self.unmap_from_host(target, connector).await.map_err(|err| {
            DriverError::operation(Operation::TerminateConnection, shown, err)
        })
    }

    async fn unmap_from_host(
        &self,
        target: EntityRef,
        connector: &Connector,
    ) -> Result<(), DriverError> {
        let resolved = match target {
            EntityRef::Resolved(resolved) => Some(resolved),
            EntityRef::Unresolved(id) => self
                .find_volume(&naming::volume_name(&id))
                .await?
                .map(MappingTarget::Volume),
        };

        let host_name = naming::host_name(&connector.host);
        let Some(host) = self.find_by_name::<Host>("name", &host_name).await? else {
            warn!(host = %host_name, "host not found on the array");
            return Ok(());
        };

        if let Some(mapped) = &resolved {
            debug!(volume = mapped.name(), host = %host_name, "searching and deleting mapping");
            let mapping = self
                .client
                .find::<Mapping>(
                    Filters::new()
                        .refers_to("volume", &mapped.object_ref())
                        .refers_to("host", &host.object_ref()),
                )
                .await?;
            if let Some(found) = mapping {
                self.client.delete(&found).await?;
            }
        }

        let remaining = self
            .client
            .search::<Mapping>(Filters::new().refers_to("host", &host.object_ref()))
            .await?;
        if remaining.is_empty() {
            debug!(host = %host_name, "deleting host without mappings");
            self.client.delete(&host).await?;
        }
        Ok(())
    }

    /// Deletes the host named `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Array`] when the lookup or deletion fails.
    pub async fn delete_host_by_name(&self, name: &str) -> Result<(), DriverError> {
        if let Some(host) = self.find_by_name::<Host>("name", name).await? {
            self.client.delete(&host).await?;
        }
        Ok(())
    }

    async fn discard_host(&self, name: &str) {
        if let Err(err) = self.delete_host_by_name(name).await {
            warn!(host = name, error = %err, "could not delete newly created host");
        }
    }
}
