// SPDX-License-Identifier: GPL-3.0-only

pub mod arbitration;
pub mod correction;

pub use arbitration::{ArbitrationEngine, ArbitrationError};
