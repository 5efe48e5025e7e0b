// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;

use arbiter_contracts::ArbiterError;
use arbiter_types::AttachMode;
use zbus::interface;

use super::blocking;
use crate::error::ServiceError;
use crate::frontend::ArbiterFrontend;

/// D-Bus interface for attaching disk images
pub struct ImageHandler {
    frontend: Arc<ArbiterFrontend>,
}

impl ImageHandler {
    pub fn new(frontend: Arc<ArbiterFrontend>) -> Self {
        Self { frontend }
    }
}

#[interface(name = "org.diskarbiter.Arbiter.Image")]
impl ImageHandler {
    /// Attach a disk image
    ///
    /// **Arguments:**
    /// - `image_path`: path of the image file
    /// - `mode`: "none", "read_only" or "read_write"
    /// - `password`: passphrase for encrypted images, empty for none
    ///
    /// Returns the identifiers of the attached disks.
    async fn attach_disk(
        &self,
        image_path: String,
        mode: String,
        password: String,
    ) -> Result<Vec<String>, ArbiterError> {
        tracing::info!("AttachDisk called for {image_path} ({mode})");

        let mode: AttachMode = mode.parse().map_err(ServiceError::from)?;
        let image = PathBuf::from(image_path);
        let password = (!password.is_empty()).then_some(password);

        blocking(&self.frontend, move |frontend| {
            frontend.attach_disk(&image, mode, password.as_deref())
        })
        .await
    }
}
