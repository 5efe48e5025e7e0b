// SPDX-License-Identifier: GPL-3.0-only

use zbus::DBusError;

/// Errors returned by every `diskarbiterd` RPC method.
///
/// Each variant travels as a named D-Bus error under the
/// `org.diskarbiter.Arbiter.Error` prefix, so clients decode the same type.
#[derive(Debug, DBusError)]
#[zbus(prefix = "org.diskarbiter.Arbiter.Error")]
pub enum ArbiterError {
    #[zbus(error)]
    ZBus(zbus::Error),

    /// The referenced disk is unknown to the registry
    NotFound(String),

    /// An operation precondition does not hold
    InvalidState(String),

    /// The requested arbitration mode is already the current one
    AlreadyInEffect(String),

    /// Decoded platform failure
    PlatformOperationFailed(String),

    /// The image utility exited unsuccessfully; carries its stderr
    SubprocessFailed(String),

    Internal(String),
}
