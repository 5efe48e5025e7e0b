// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use arbiter_contracts::ArbiterError;
use arbiter_types::ArbitrationMode;
use zbus::interface;

use super::blocking;
use crate::error::ServiceError;
use crate::frontend::ArbiterFrontend;

/// D-Bus interface for the system-wide mount policy
pub struct ArbitrationHandler {
    frontend: Arc<ArbiterFrontend>,
}

impl ArbitrationHandler {
    pub fn new(frontend: Arc<ArbiterFrontend>) -> Self {
        Self { frontend }
    }
}

#[interface(name = "org.diskarbiter.Arbiter.Arbitration")]
impl ArbitrationHandler {
    /// Switch the arbitration mode
    ///
    /// **Arguments:**
    /// - `mode`: "disabled", "block" or "force_read_only"
    ///
    /// Fails with `AlreadyInEffect` when `mode` is the current mode.
    async fn arbitrate(&self, mode: String) -> Result<(), ArbiterError> {
        tracing::info!("Arbitrate called with {mode}");

        let mode: ArbitrationMode = mode.parse().map_err(ServiceError::from)?;
        blocking(&self.frontend, move |frontend| frontend.arbitrate(mode)).await
    }

    /// Current arbitration mode
    #[zbus(property)]
    async fn mode(&self) -> String {
        self.frontend.mode().to_string()
    }
}
