// SPDX-License-Identifier: GPL-3.0-only

//! Blocking mount/unmount/eject on top of the platform's callback API
//!
//! Each request creates a [`PendingOperation`], issues the native call with
//! its completion and blocks the calling thread until the platform answers.
//! Callers must therefore run on a blocking-capable thread.

mod pending;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use arbiter_contracts::{ArbitrationPlatform, PlatformError, UnmountScope};
use arbiter_types::{Disk, MountMode};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use pending::PendingOperation;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    InvalidState(String),

    #[error("Error {operation} {disk}: {message}")]
    PlatformOperationFailed {
        operation: &'static str,
        disk: String,
        message: String,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl BridgeError {
    fn failed(operation: &'static str, disk: &str, message: impl Into<String>) -> Self {
        Self::PlatformOperationFailed {
            operation,
            disk: disk.to_string(),
            message: message.into(),
        }
    }
}

/// Legacy journaled filesystem rejecting read-only mounts of a dirty journal
const JOURNALED_HFS_KIND: &str = "hfs";

#[derive(Clone)]
pub struct OperationBridge {
    platform: Arc<dyn ArbitrationPlatform>,
}

impl OperationBridge {
    pub fn new(platform: Arc<dyn ArbitrationPlatform>) -> Self {
        Self { platform }
    }

    /// Mount `disk` and return the resulting mount path.
    pub fn mount(
        &self,
        disk: &Disk,
        mode: MountMode,
        args: &[String],
        path: Option<&Path>,
    ) -> Result<String, BridgeError> {
        let description = &disk.description;
        if description.volume_mountable == Some(false) {
            return Err(BridgeError::InvalidState(format!(
                "Disk {} is not mountable",
                disk.id
            )));
        }
        if let Some(mounted_at) = description.mount_path() {
            return Err(BridgeError::InvalidState(format!(
                "Disk {} is already mounted at {mounted_at}",
                disk.id
            )));
        }

        let mut args = args.to_vec();
        if mode == MountMode::ReadOnly {
            if description.volume_kind.as_deref() == Some(JOURNALED_HFS_KIND) {
                args.push("-j".to_string());
            }
            args.push("rdonly".to_string());
        }

        debug!("Mounting {} ({mode}) with {:?}", disk.id, args);
        let (done, pending) = PendingOperation::new();
        self.platform.mount(&disk.id, path, &args, done)?;
        pending
            .wait()
            .map_err(|message| BridgeError::failed("mounting", &disk.id, message))?;

        let refreshed = self.platform.describe(&disk.id)?;
        let mount_path = refreshed.mount_path().ok_or_else(|| {
            BridgeError::failed(
                "mounting",
                &disk.id,
                "Disk has no mount point even after the mount completed",
            )
        })?;

        info!("Mounted {} at {mount_path}", disk.id);
        Ok(mount_path.to_string())
    }

    /// A present but empty volume path marks a disk known to be unmounted.
    fn ensure_not_unmounted(disk: &Disk) -> Result<(), BridgeError> {
        if disk.description.volume_path.as_deref() == Some("") {
            return Err(BridgeError::InvalidState(format!(
                "Disk {} is not mounted",
                disk.id
            )));
        }
        Ok(())
    }

    pub fn unmount(&self, disk: &Disk) -> Result<(), BridgeError> {
        Self::ensure_not_unmounted(disk)?;

        let scope = if disk.is_whole() {
            UnmountScope::WholeDisk
        } else {
            UnmountScope::Volume
        };
        self.unmount_with_scope(disk, scope)
    }

    fn unmount_with_scope(&self, disk: &Disk, scope: UnmountScope) -> Result<(), BridgeError> {
        debug!("Unmounting {} ({scope:?})", disk.id);
        let (done, pending) = PendingOperation::new();
        self.platform.unmount(&disk.id, scope, done)?;
        pending
            .wait()
            .map_err(|message| BridgeError::failed("unmounting", &disk.id, message))?;

        info!("Unmounted {}", disk.id);
        Ok(())
    }

    pub fn eject(&self, disk: &Disk) -> Result<(), BridgeError> {
        if disk.description.media_ejectable == Some(false) {
            return Err(BridgeError::InvalidState(format!(
                "Disk {} is not ejectable",
                disk.id
            )));
        }

        // Everything on the disk has to be unmounted before it can go
        if !disk.children.is_empty()
            && let Err(err) = Self::ensure_not_unmounted(disk)
                .and_then(|()| self.unmount_with_scope(disk, UnmountScope::WholeDisk))
        {
            warn!("Ignoring failed unmount before ejecting {}: {err}", disk.id);
        }

        let (done, pending) = PendingOperation::new();
        self.platform.eject(&disk.id, done)?;
        pending
            .wait()
            .map_err(|message| BridgeError::failed("ejecting", &disk.id, message))?;

        info!("Ejected {}", disk.id);
        Ok(())
    }
}
