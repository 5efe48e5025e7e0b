// SPDX-License-Identifier: GPL-3.0-only

//! Disk inventory and explicit disk operations D-Bus interface

use std::path::PathBuf;
use std::sync::Arc;

use arbiter_contracts::ArbiterError;
use arbiter_types::MountMode;
use zbus::interface;

use super::blocking;
use crate::error::ServiceError;
use crate::frontend::ArbiterFrontend;

/// D-Bus interface for listing and operating on registered disks
pub struct DisksHandler {
    frontend: Arc<ArbiterFrontend>,
}

impl DisksHandler {
    pub fn new(frontend: Arc<ArbiterFrontend>) -> Self {
        Self { frontend }
    }
}

#[interface(name = "org.diskarbiter.Arbiter.Disks")]
impl DisksHandler {
    /// List every registered disk
    ///
    /// Returns a JSON-serialized array of Disk objects, whole disks first
    /// with their slices after them.
    async fn list_disks(&self) -> Result<String, ArbiterError> {
        tracing::info!("ListDisks called");

        let disks = self.frontend.list_disks();
        tracing::debug!("Listing {} disks", disks.len());

        Ok(serde_json::to_string(&disks).map_err(ServiceError::from)?)
    }

    /// Get the description of a registered disk
    ///
    /// **Arguments:**
    /// - `disk_id`: BSD name (e.g., "disk2s1")
    ///
    /// Returns a JSON-serialized DiskDescription.
    async fn disk_info(&self, disk_id: String) -> Result<String, ArbiterError> {
        tracing::info!("DiskInfo called for {disk_id}");

        let description = self.frontend.disk_info(&disk_id)?;
        Ok(serde_json::to_string(&description).map_err(ServiceError::from)?)
    }

    /// Mount a registered disk
    ///
    /// **Arguments:**
    /// - `disk_id`: BSD name
    /// - `mode`: "read_only" or "read_write"
    /// - `args`: extra mount options passed to the platform
    /// - `path`: mount point, empty to let the platform choose
    ///
    /// Returns the resulting mount path.
    async fn mount_disk(
        &self,
        disk_id: String,
        mode: String,
        args: Vec<String>,
        path: String,
    ) -> Result<String, ArbiterError> {
        tracing::info!("MountDisk called for {disk_id} ({mode})");

        let mode: MountMode = mode.parse().map_err(ServiceError::from)?;
        let path = (!path.is_empty()).then(|| PathBuf::from(path));

        blocking(&self.frontend, move |frontend| {
            frontend.mount_disk(&disk_id, mode, &args, path.as_deref())
        })
        .await
    }

    /// Unmount a registered disk, every volume on it for a whole disk
    async fn unmount_disk(&self, disk_id: String) -> Result<(), ArbiterError> {
        tracing::info!("UnmountDisk called for {disk_id}");

        blocking(&self.frontend, move |frontend| frontend.unmount_disk(&disk_id)).await
    }

    /// Eject a registered disk after unmounting its volumes
    async fn eject_disk(&self, disk_id: String) -> Result<(), ArbiterError> {
        tracing::info!("EjectDisk called for {disk_id}");

        blocking(&self.frontend, move |frontend| frontend.eject_disk(&disk_id)).await
    }
}
