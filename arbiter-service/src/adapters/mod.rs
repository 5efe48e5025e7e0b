// SPDX-License-Identifier: GPL-3.0-only

//! Host platform adapters

#[cfg(target_os = "macos")]
mod diskarbitration;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod translate;

use std::sync::Arc;

use anyhow::Result;
use arbiter_contracts::ArbitrationPlatform;

/// The disk arbitration facility of the running host.
#[cfg(target_os = "macos")]
pub fn default_platform() -> Result<Arc<dyn ArbitrationPlatform>> {
    Ok(Arc::new(diskarbitration::DiskArbitration::new()))
}

#[cfg(not(target_os = "macos"))]
pub fn default_platform() -> Result<Arc<dyn ArbitrationPlatform>> {
    anyhow::bail!("Disk arbitration is only available on macOS")
}
