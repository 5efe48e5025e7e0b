// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use arbiter_contracts::protocol::names::DEFAULT_SOCKET_PATH;
use arbiter_sys::DEFAULT_HDIUTIL_PATH;
use clap::Parser;

pub const DEFAULT_LOG_FILTER: &str = "diskarbiterd=info,warn";

/// Disk mount arbitration daemon
#[derive(Debug, Parser)]
#[command(name = "diskarbiterd")]
#[command(about = "Arbitrates disk mounts and serves disk operations over a local socket", long_about = None)]
#[command(version)]
pub struct Config {
    /// Path of the listening Unix socket
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    /// Disk image utility used to attach images
    #[arg(long, default_value = DEFAULT_HDIUTIL_PATH)]
    pub hdiutil: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_system_locations() {
        let config = Config::try_parse_from(["diskarbiterd"]).unwrap();
        assert_eq!(config.socket, PathBuf::from("/private/var/diskarbiterd/socket"));
        assert_eq!(config.hdiutil, PathBuf::from("/usr/bin/hdiutil"));
        assert_eq!(config.log_filter, "diskarbiterd=info,warn");
    }

    #[test]
    fn options_override_defaults() {
        let config = Config::try_parse_from([
            "diskarbiterd",
            "--socket",
            "/tmp/arbiter.sock",
            "--log-filter",
            "debug",
        ])
        .unwrap();
        assert_eq!(config.socket, PathBuf::from("/tmp/arbiter.sock"));
        assert_eq!(config.log_filter, "debug");
    }
}
