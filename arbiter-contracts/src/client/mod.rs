// SPDX-License-Identifier: GPL-3.0-only

//! Typed client for the `diskarbiterd` RPC surface

pub mod arbiter;
pub mod error;
pub mod proxies;

pub use arbiter::ArbiterClient;
pub use error::ClientError;
