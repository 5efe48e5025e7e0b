// SPDX-License-Identifier: GPL-3.0-only

//! Cross-thread shared state: the registry, the arbitration mode and the
//! self-mount markers, all behind one mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arbiter_types::ArbitrationMode;
use tracing::debug;

use crate::registry::DiskRegistry;

#[derive(Debug, Default)]
pub struct ArbiterState {
    pub registry: DiskRegistry,
    pub mode: ArbitrationMode,
    /// Disks with an arbiter-initiated mount in flight, with nesting count
    self_mounts: HashMap<String, usize>,
}

impl ArbiterState {
    pub fn is_self_mount(&self, id: &str) -> bool {
        self.self_mounts.contains_key(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<Mutex<ArbiterState>>);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state. A panic while holding the lock does not leave the
    /// registry structurally invalid, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> ArbitrationMode {
        self.lock().mode
    }

    #[cfg(test)]
    pub fn is_self_mount(&self, id: &str) -> bool {
        self.lock().is_self_mount(id)
    }

    /// Mark `id` as undergoing a self-initiated mount until the returned
    /// guard is dropped.
    pub fn mark_self_mount(&self, id: &str) -> SelfMountGuard {
        *self.lock().self_mounts.entry(id.to_string()).or_default() += 1;
        debug!("Marked {id} as self-mounting");

        SelfMountGuard {
            state: self.clone(),
            id: id.to_string(),
        }
    }
}

/// Removes a self-mount marker on drop, whatever the mount outcome.
#[must_use = "the marker is removed as soon as the guard is dropped"]
pub struct SelfMountGuard {
    state: SharedState,
    id: String,
}

impl Drop for SelfMountGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(count) = state.self_mounts.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                state.self_mounts.remove(&self.id);
            }
        }
        debug!("Cleared self-mount marker for {}", self.id);
    }
}
