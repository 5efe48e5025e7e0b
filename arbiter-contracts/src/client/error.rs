// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use crate::protocol::ArbiterError;

/// Errors that can occur when calling the daemon
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Service(#[from] ArbiterError),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<zbus::Error> for ClientError {
    fn from(err: zbus::Error) -> Self {
        ClientError::Service(ArbiterError::from(err))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}

impl From<arbiter_types::ParseModeError> for ClientError {
    fn from(err: arbiter_types::ParseModeError) -> Self {
        ClientError::Parse(err.to_string())
    }
}
