// SPDX-License-Identifier: GPL-3.0-only

use arbiter_contracts::ArbiterError;
use arbiter_sys::AttachError;
use arbiter_types::mode::ParseModeError;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::policies::ArbitrationError;

/// Service-specific errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Disk not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Arbitration(#[from] ArbitrationError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ParseModeError> for ServiceError {
    fn from(err: ParseModeError) -> Self {
        ServiceError::InvalidArgument(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("Task join error: {err}"))
    }
}

impl From<ServiceError> for ArbiterError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(id) => ArbiterError::NotFound(id),
            ServiceError::Bridge(BridgeError::InvalidState(msg)) => ArbiterError::InvalidState(msg),
            ServiceError::Bridge(err) => ArbiterError::PlatformOperationFailed(err.to_string()),
            ServiceError::Attach(AttachError::InvalidState(msg)) => ArbiterError::InvalidState(msg),
            ServiceError::Attach(err) => ArbiterError::SubprocessFailed(err.to_string()),
            ServiceError::Arbitration(ArbitrationError::AlreadyInEffect(mode)) => {
                ArbiterError::AlreadyInEffect(format!(
                    "Already arbitrating in the requested mode ({mode})"
                ))
            }
            ServiceError::Arbitration(err) => {
                ArbiterError::PlatformOperationFailed(err.to_string())
            }
            ServiceError::InvalidArgument(msg) => ArbiterError::InvalidState(msg),
            ServiceError::Serialization(_) | ServiceError::Internal(_) => {
                ArbiterError::Internal(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_types::ArbitrationMode;

    #[test]
    fn bridge_errors_keep_their_kind() {
        let err: ArbiterError =
            ServiceError::from(BridgeError::InvalidState("Disk disk2 is not mounted".into())).into();
        assert!(matches!(err, ArbiterError::InvalidState(msg) if msg == "Disk disk2 is not mounted"));

        let err: ArbiterError = ServiceError::from(BridgeError::PlatformOperationFailed {
            operation: "ejecting",
            disk: "disk2".into(),
            message: "Disk arbitration error 9: Busy".into(),
        })
        .into();
        assert!(matches!(
            err,
            ArbiterError::PlatformOperationFailed(msg)
                if msg == "Error ejecting disk2: Disk arbitration error 9: Busy"
        ));
    }

    #[test]
    fn attach_errors_map_to_state_or_subprocess() {
        let err: ArbiterError = ServiceError::from(AttachError::InvalidState(
            "Image is encrypted and a password was not provided".into(),
        ))
        .into();
        assert!(matches!(err, ArbiterError::InvalidState(_)));

        let err: ArbiterError = ServiceError::from(AttachError::SubprocessFailed {
            program: "/usr/bin/hdiutil".into(),
            outcome: "exited with status 1".into(),
            stderr: "hdiutil: attach failed - no mountable file systems".into(),
        })
        .into();
        assert!(matches!(err, ArbiterError::SubprocessFailed(msg) if msg.contains("no mountable")));
    }

    #[test]
    fn repeated_mode_maps_to_already_in_effect() {
        let err: ArbiterError =
            ServiceError::from(ArbitrationError::AlreadyInEffect(ArbitrationMode::Block)).into();
        assert!(matches!(err, ArbiterError::AlreadyInEffect(msg) if msg.contains("block")));
    }

    #[test]
    fn not_found_carries_identifier() {
        let err: ArbiterError = ServiceError::NotFound("disk9".into()).into();
        assert!(matches!(err, ArbiterError::NotFound(id) if id == "disk9"));
    }
}
