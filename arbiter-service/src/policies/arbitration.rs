// SPDX-License-Identifier: GPL-3.0-only

//! System-wide mount arbitration
//!
//! While a mode other than `Disabled` is in effect the engine is registered
//! as the platform's mount approval handler and decides every mount attempt
//! on the dispatch thread. In `ForceReadOnly` the original request is denied
//! and a read-only mount of the same disk is issued from a correction
//! thread. Options the original requester passed are not recoverable.

use std::sync::{Arc, Mutex, PoisonError};

use arbiter_contracts::{
    Approval, ArbitrationPlatform, MountApprovalHandler, PlatformError, RawDisk,
};
use arbiter_types::{ArbitrationMode, Disk, MountMode};
use thiserror::Error;
use tracing::{error, info, warn};

use super::correction::CorrectionTracker;
use crate::bridge::OperationBridge;
use crate::state::SharedState;

pub const BLOCKED_MESSAGE: &str = "Mounts in this system are currently blocked";
pub const FORCED_READ_ONLY_MESSAGE: &str = "Forcing mount read-only";

#[derive(Debug, Error)]
pub enum ArbitrationError {
    #[error("Already arbitrating in the requested mode ({0})")]
    AlreadyInEffect(ArbitrationMode),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    /// Deny, then mount the disk read-only on the arbiter's behalf
    RemountReadOnly,
}

pub trait ArbitrationDomain: Send + Sync {
    fn decide(&self, mode: ArbitrationMode, self_initiated: bool) -> Decision;
}

pub struct ArbitrationPolicy;

impl ArbitrationDomain for ArbitrationPolicy {
    fn decide(&self, mode: ArbitrationMode, self_initiated: bool) -> Decision {
        if self_initiated {
            return Decision::Allow;
        }

        match mode {
            ArbitrationMode::Disabled => Decision::Allow,
            ArbitrationMode::Block => Decision::Deny,
            ArbitrationMode::ForceReadOnly => Decision::RemountReadOnly,
        }
    }
}

pub struct ArbitrationEngine {
    state: SharedState,
    platform: Arc<dyn ArbitrationPlatform>,
    bridge: OperationBridge,
    domain: Arc<dyn ArbitrationDomain>,
    corrections: CorrectionTracker,
    /// Serializes mode transitions; the state lock is not held across
    /// platform registration calls.
    transition: Mutex<()>,
}

impl ArbitrationEngine {
    pub fn new(state: SharedState, platform: Arc<dyn ArbitrationPlatform>) -> Arc<Self> {
        Arc::new(Self {
            state,
            bridge: OperationBridge::new(platform.clone()),
            platform,
            domain: Arc::new(ArbitrationPolicy),
            corrections: CorrectionTracker::new(),
            transition: Mutex::new(()),
        })
    }

    pub fn mode(&self) -> ArbitrationMode {
        self.state.mode()
    }

    #[cfg(test)]
    pub fn corrections(&self) -> &CorrectionTracker {
        &self.corrections
    }

    /// Switch the arbitration mode, registering or unregistering the
    /// approval handler when crossing the `Disabled` boundary.
    pub fn set_mode(self: &Arc<Self>, mode: ArbitrationMode) -> Result<(), ArbitrationError> {
        let _transition = self
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.state.mode();
        if current == mode {
            return Err(ArbitrationError::AlreadyInEffect(mode));
        }

        match (current.is_enabled(), mode.is_enabled()) {
            // The handler may be asked to decide as soon as it is registered,
            // so the new mode must already be visible.
            (false, true) => {
                self.state.lock().mode = mode;
                let handler: Arc<dyn MountApprovalHandler> = self.clone();
                if let Err(err) = self.platform.register_approval(handler) {
                    self.state.lock().mode = current;
                    return Err(err.into());
                }
            }
            (true, false) => {
                self.platform.unregister_approval()?;
                self.state.lock().mode = mode;
            }
            _ => self.state.lock().mode = mode,
        }

        info!("Arbitration mode changed from {current} to {mode}");
        Ok(())
    }

    /// Stop intercepting mounts and wait for in-flight corrections.
    pub fn shutdown(self: &Arc<Self>) {
        if self.mode().is_enabled()
            && let Err(err) = self.set_mode(ArbitrationMode::Disabled)
        {
            warn!("Failed to disable arbitration on shutdown: {err}");
        }

        let in_flight = self.corrections.in_flight();
        if in_flight > 0 {
            info!("Waiting for {in_flight} read-only remount(s) to finish");
        }
        self.corrections.wait_idle();

        for outcome in self.corrections.recent_outcomes() {
            if let Err(err) = outcome.result {
                warn!(
                    "Disk {} was left unmounted after a failed read-only remount: {err}",
                    outcome.disk
                );
            }
        }
    }

    fn remount_read_only(&self, disk: Disk) {
        let state = self.state.clone();
        let bridge = self.bridge.clone();
        let id = disk.id.clone();

        let spawned = self.corrections.spawn(&id, move || {
            let _marker = state.mark_self_mount(&disk.id);
            bridge.mount(&disk, MountMode::ReadOnly, &[], None)
        });

        if let Err(err) = spawned {
            error!("Unable to start read-only remount of {id}: {err}");
        }
    }
}

impl MountApprovalHandler for ArbitrationEngine {
    fn approve_mount(&self, raw: &dyn RawDisk) -> Approval {
        let description = raw.description();
        let Some(id) = raw.id().or_else(|| {
            description
                .as_ref()
                .ok()
                .and_then(|d| d.media_bsd_name.clone())
        }) else {
            warn!("Mount requested for a disk without a BSD name, allowing");
            return Approval::Allow;
        };

        info!("Mount intercepted for disk: {id}");

        let (mode, self_initiated) = {
            let state = self.state.lock();
            (state.mode, state.is_self_mount(&id))
        };

        match self.domain.decide(mode, self_initiated) {
            Decision::Allow => {
                info!("Mount allowed for disk: {id}");
                Approval::Allow
            }
            Decision::Deny => {
                info!("Mount blocked for disk: {id}");
                Approval::Deny(BLOCKED_MESSAGE.to_string())
            }
            Decision::RemountReadOnly => {
                info!("Mount forced read-only for disk: {id}");
                let description = description.unwrap_or_else(|err| {
                    warn!("Unable to describe {id} before remounting: {err}");
                    Default::default()
                });
                self.remount_read_only(Disk::new(id, description));
                Approval::Deny(FORCED_READ_ONLY_MESSAGE.to_string())
            }
        }
    }
}
