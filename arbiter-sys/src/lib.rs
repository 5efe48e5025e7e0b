// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for the diskarbiter daemon
//!
//! This crate drives the host's disk image utility as a subprocess:
//! - Spawning it with three concurrently serviced pipes
//! - Building attach argument lists and stdin payloads
//! - Parsing its property-list output
//!
//! The utility requires root for most attach operations, so these calls
//! are meant to run inside the privileged daemon.

pub mod error;
pub mod hdiutil;
pub mod process;

pub use error::{AttachError, Result};
pub use hdiutil::{DEFAULT_HDIUTIL_PATH, Hdiutil, ImageAttacher};
pub use process::{CommandOutput, CommandRunner, ExitOutcome, PipedRunner};
