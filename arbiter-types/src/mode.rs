// SPDX-License-Identifier: GPL-3.0-only

//! Operating modes exchanged between clients and the daemon

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} mode: {value}")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
}

impl ParseModeError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// System-wide mount arbitration policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationMode {
    /// Every mount request is allowed
    #[default]
    Disabled,

    /// Every foreign mount request is denied
    Block,

    /// Foreign mount requests are denied and replaced by a read-only mount
    ForceReadOnly,
}

impl ArbitrationMode {
    /// Whether mount approvals must be intercepted in this mode
    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Block => "block",
            Self::ForceReadOnly => "force_read_only",
        }
    }
}

impl fmt::Display for ArbitrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArbitrationMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            "block" => Ok(Self::Block),
            "force_read_only" | "ro" | "readonly" => Ok(Self::ForceReadOnly),
            _ => Err(ParseModeError::new("arbitration", s)),
        }
    }
}

/// Access mode for mounting a registered disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

impl MountMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::ReadWrite => "read_write",
        }
    }
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MountMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read_only" | "ro" => Ok(Self::ReadOnly),
            "read_write" | "rw" => Ok(Self::ReadWrite),
            _ => Err(ParseModeError::new("mount", s)),
        }
    }
}

/// What to do with the volumes of a freshly attached disk image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachMode {
    /// Attach the devices without mounting any volume
    None,
    ReadOnly,
    ReadWrite,
}

impl AttachMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ReadOnly => "read_only",
            Self::ReadWrite => "read_write",
        }
    }
}

impl fmt::Display for AttachMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "nomount" => Ok(Self::None),
            "read_only" | "ro" => Ok(Self::ReadOnly),
            "read_write" | "rw" => Ok(Self::ReadWrite),
            _ => Err(ParseModeError::new("attach", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitration_mode_defaults_to_disabled() {
        assert_eq!(ArbitrationMode::default(), ArbitrationMode::Disabled);
        assert!(!ArbitrationMode::Disabled.is_enabled());
        assert!(ArbitrationMode::Block.is_enabled());
        assert!(ArbitrationMode::ForceReadOnly.is_enabled());
    }

    #[test]
    fn modes_parse_their_wire_names() {
        for mode in [
            ArbitrationMode::Disabled,
            ArbitrationMode::Block,
            ArbitrationMode::ForceReadOnly,
        ] {
            assert_eq!(mode.as_str().parse::<ArbitrationMode>(), Ok(mode));
        }
        for mode in [AttachMode::None, AttachMode::ReadOnly, AttachMode::ReadWrite] {
            assert_eq!(mode.as_str().parse::<AttachMode>(), Ok(mode));
        }
        assert_eq!("RW".parse::<MountMode>(), Ok(MountMode::ReadWrite));
    }

    #[test]
    fn short_cli_aliases_are_accepted() {
        assert_eq!("off".parse::<ArbitrationMode>(), Ok(ArbitrationMode::Disabled));
        assert_eq!("ro".parse::<ArbitrationMode>(), Ok(ArbitrationMode::ForceReadOnly));
        assert_eq!("nomount".parse::<AttachMode>(), Ok(AttachMode::None));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = "sideways".parse::<MountMode>().unwrap_err();
        assert_eq!(err.to_string(), "invalid mount mode: sideways");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ArbitrationMode::ForceReadOnly).unwrap();
        assert_eq!(json, "\"force_read_only\"");
    }
}
