// SPDX-License-Identifier: GPL-3.0-only

//! D-Bus interfaces served on every peer connection

pub mod arbitration;
pub mod disks;
pub mod image;

use std::sync::Arc;

use arbiter_contracts::ArbiterError;

use crate::error::{Result, ServiceError};
use crate::frontend::ArbiterFrontend;

pub use arbitration::ArbitrationHandler;
pub use disks::DisksHandler;
pub use image::ImageHandler;

/// Run a blocking front-end operation on the blocking pool.
async fn blocking<T, F>(frontend: &Arc<ArbiterFrontend>, op: F) -> std::result::Result<T, ArbiterError>
where
    T: Send + 'static,
    F: FnOnce(&ArbiterFrontend) -> Result<T> + Send + 'static,
{
    let frontend = frontend.clone();
    let result = tokio::task::spawn_blocking(move || op(&frontend))
        .await
        .map_err(ServiceError::from)?;

    result.map_err(|err| {
        tracing::warn!("Request failed: {err}");
        ArbiterError::from(err)
    })
}
