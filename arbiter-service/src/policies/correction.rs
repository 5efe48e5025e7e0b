// SPDX-License-Identifier: GPL-3.0-only

//! Supervision of read-only correction mounts
//!
//! Corrections run on their own threads so the approval callback returns
//! immediately. Their handles and outcomes are kept so failures show up in
//! the log and shutdown can wait for them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use crate::bridge::BridgeError;

/// Outcomes kept for inspection
const OUTCOME_HISTORY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionOutcome {
    pub disk: String,
    /// Mount path on success, error description on failure
    pub result: Result<String, String>,
}

#[derive(Debug, Default)]
struct Inner {
    handles: Vec<JoinHandle<()>>,
    outcomes: VecDeque<CorrectionOutcome>,
}

#[derive(Debug, Default)]
pub struct CorrectionTracker {
    inner: Arc<Mutex<Inner>>,
}

impl CorrectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` for `disk` on a dedicated thread.
    pub fn spawn<F>(&self, disk: &str, job: F) -> std::io::Result<()>
    where
        F: FnOnce() -> Result<String, BridgeError> + Send + 'static,
    {
        let inner = self.inner.clone();
        let target = disk.to_string();

        let handle = thread::Builder::new()
            .name(format!("remount-ro-{disk}"))
            .spawn(move || {
                let result = job();
                match &result {
                    Ok(path) => info!("Remounted {target} read-only at {path}"),
                    Err(err) => error!("Read-only remount of {target} failed: {err}"),
                }

                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.outcomes.len() == OUTCOME_HISTORY {
                    inner.outcomes.pop_front();
                }
                inner.outcomes.push_back(CorrectionOutcome {
                    disk: target,
                    result: result.map_err(|err| err.to_string()),
                });
            })?;

        let mut inner = self.lock();
        inner.handles.retain(|handle| !handle.is_finished());
        inner.handles.push(handle);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn in_flight(&self) -> usize {
        self.lock()
            .handles
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Most recent correction outcomes, oldest first.
    pub fn recent_outcomes(&self) -> Vec<CorrectionOutcome> {
        self.lock().outcomes.iter().cloned().collect()
    }

    /// Block until every correction spawned so far has finished.
    pub fn wait_idle(&self) {
        let handles = std::mem::take(&mut self.lock().handles);
        for handle in handles {
            if handle.join().is_err() {
                error!("Read-only remount thread panicked");
            }
        }
    }
}
