// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for disk image operations
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{program} {outcome}: {stderr}")]
    SubprocessFailed {
        program: String,
        outcome: String,
        stderr: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed property list: {0}")]
    Plist(#[from] plist::Error),

    #[error("Missing key in property list: {0}")]
    MissingKey(&'static str),
}

/// Result type alias for image operations
pub type Result<T> = std::result::Result<T, AttachError>;
