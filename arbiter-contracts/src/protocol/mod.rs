// SPDX-License-Identifier: GPL-3.0-only

pub mod error;
pub mod names;

pub use error::ArbiterError;
