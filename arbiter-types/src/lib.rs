// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for diskarbiter
//!
//! This crate defines the single source of truth for the types that cross
//! the daemon's boundaries:
//!
//! - **arbiter-service**: keeps `Disk` records in its registry and
//!   serializes them for RPC transport
//! - **arbiter-contracts**: platform adapters produce `DiskDescription`s
//! - **arbiter-sys**: the image attach driver consumes `AttachMode`
//!
//! ## Hierarchy
//!
//! Disks form a two-level tree: a *whole* disk owns its slices through
//! `Disk::children`, and every slice points back through `Disk::parent`.
//! [`order_hierarchically`] flattens that tree for inventory listings.

pub mod disk;
pub mod mode;

pub use disk::{Disk, DiskDescription, order_hierarchically};
pub use mode::{ArbitrationMode, AttachMode, MountMode, ParseModeError};
