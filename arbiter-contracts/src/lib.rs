// SPDX-License-Identifier: GPL-3.0-only

pub mod client;
pub mod platform;
pub mod protocol;

pub use client::{ArbiterClient, ClientError};
pub use platform::{
    Approval, ArbitrationPlatform, Completion, DiskEventSink, Dissent, MountApprovalHandler,
    PlatformError, RawDisk, UnmountScope,
};
pub use protocol::ArbiterError;
