// SPDX-License-Identifier: GPL-3.0-only

use arbiter_contracts::{Completion, Dissent};
use tokio::sync::oneshot;

use super::status::decode_status;

/// One-shot channel pairing an issued native request with the thread
/// waiting for its result.
pub struct PendingOperation {
    receiver: oneshot::Receiver<Option<Dissent>>,
}

impl PendingOperation {
    /// Create the pending operation and the completion that resolves it.
    pub fn new() -> (Completion, Self) {
        let (sender, receiver) = oneshot::channel();
        let completion: Completion = Box::new(move |dissent| {
            // The waiter may already be gone if it gave up on a dropped request
            let _ = sender.send(dissent);
        });
        (completion, Self { receiver })
    }

    /// Block until the completion fires.
    ///
    /// Returns the decoded failure description on error. Must not be called
    /// from an async context.
    pub fn wait(self) -> Result<(), String> {
        match self.receiver.blocking_recv() {
            Ok(None) => Ok(()),
            Ok(Some(dissent)) => Err(decode_status(dissent.status, dissent.message.as_deref())),
            Err(_) => Err("Platform dropped the request without completing it".to_string()),
        }
    }
}
