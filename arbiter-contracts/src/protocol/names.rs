// SPDX-License-Identifier: GPL-3.0-only

//! Well-known D-Bus names and object paths served by `diskarbiterd`

pub const SERVICE_NAME: &str = "org.diskarbiter.Arbiter";

pub const ROOT_PATH: &str = "/org/diskarbiter/Arbiter";
pub const DISKS_PATH: &str = "/org/diskarbiter/Arbiter/disks";
pub const IMAGE_PATH: &str = "/org/diskarbiter/Arbiter/image";
pub const ARBITRATION_PATH: &str = "/org/diskarbiter/Arbiter/arbitration";

/// Default location of the daemon's listening socket
pub const DEFAULT_SOCKET_PATH: &str = "/private/var/diskarbiterd/socket";
