// SPDX-License-Identifier: GPL-3.0-only

use zbus::interface;

/// Root object of the arbiter service
pub struct ArbiterService {
    version: String,
}

impl ArbiterService {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[interface(name = "org.diskarbiter.Arbiter")]
impl ArbiterService {
    /// Get service version
    #[zbus(property)]
    async fn version(&self) -> &str {
        &self.version
    }
}
