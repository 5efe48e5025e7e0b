// SPDX-License-Identifier: GPL-3.0-only

//! Seam between the daemon and the host's disk arbitration facility
//!
//! The host delivers disk events and mount approvals on a single dispatch
//! context and completes mount/unmount/eject requests through callbacks.
//! Implementations translate their native handles into [`RawDisk`] and
//! invoke the registered sinks and handlers from that dispatch context.

use std::path::Path;
use std::sync::Arc;

use arbiter_types::DiskDescription;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Unknown disk: {0}")]
    UnknownDisk(String),

    #[error("Disk arbitration session error: {0}")]
    Session(String),

    #[error("Platform call failed: {0}")]
    Failed(String),
}

/// Failure reported by a native completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dissent {
    /// Raw platform status code
    pub status: i32,

    /// Optional free-text description supplied by the platform
    pub message: Option<String>,
}

impl Dissent {
    pub fn new(status: i32, message: Option<String>) -> Self {
        Self { status, message }
    }
}

/// One-shot completion for an asynchronous native request.
///
/// Called exactly once with `None` on success, usually on the dispatch
/// context.
pub type Completion = Box<dyn FnOnce(Option<Dissent>) + Send + 'static>;

/// Which volumes an unmount request covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountScope {
    /// Only the given disk
    Volume,

    /// Every mounted volume on the given whole disk
    WholeDisk,
}

/// Outcome of a synchronous mount approval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    Allow,
    Deny(String),
}

/// A disk handle as delivered by the platform inside a callback.
pub trait RawDisk {
    /// Platform-stable identifier (BSD name), if the disk has one
    fn id(&self) -> Option<String>;

    fn description(&self) -> Result<DiskDescription, PlatformError>;

    /// The whole disk containing this one. A whole disk returns itself.
    fn whole_disk(&self) -> Option<Box<dyn RawDisk + '_>>;
}

/// Receiver of disk lifecycle events, called on the dispatch context in
/// delivery order.
pub trait DiskEventSink: Send + Sync {
    fn disk_appeared(&self, disk: &dyn RawDisk);

    fn disk_disappeared(&self, disk: &dyn RawDisk);

    fn disk_description_changed(&self, disk: &dyn RawDisk);
}

/// Synchronous decision point for every system-wide mount attempt.
pub trait MountApprovalHandler: Send + Sync {
    fn approve_mount(&self, disk: &dyn RawDisk) -> Approval;
}

/// Host disk arbitration facility.
///
/// Request methods return once the native call has been issued; the result
/// arrives later through the supplied [`Completion`]. An `Err` return means
/// the request was never issued and the completion will not be called.
pub trait ArbitrationPlatform: Send + Sync {
    /// Start the dispatch context and deliver events to `sink`.
    fn start(&self, sink: Arc<dyn DiskEventSink>) -> Result<(), PlatformError>;

    /// Unregister event callbacks and stop the dispatch context.
    fn stop(&self);

    fn register_approval(&self, handler: Arc<dyn MountApprovalHandler>)
    -> Result<(), PlatformError>;

    fn unregister_approval(&self) -> Result<(), PlatformError>;

    /// Fetch a fresh description of a disk by identifier.
    fn describe(&self, id: &str) -> Result<DiskDescription, PlatformError>;

    fn mount(
        &self,
        id: &str,
        path: Option<&Path>,
        args: &[String],
        done: Completion,
    ) -> Result<(), PlatformError>;

    fn unmount(&self, id: &str, scope: UnmountScope, done: Completion)
    -> Result<(), PlatformError>;

    fn eject(&self, id: &str, done: Completion) -> Result<(), PlatformError>;
}
