// SPDX-License-Identifier: GPL-3.0-only

//! Decoding of disk arbitration failure statuses
//!
//! Statuses are mach error codes: 6 bits of system, 12 bits of subsystem
//! and 14 bits of code.

use nix::errno::Errno;

const SYSTEM_KERNEL: u32 = 0x00;
const SYSTEM_LOCAL: u32 = 0x3e;
const SUBSYSTEM_UNIX: u32 = 0x3;
const SUBSYSTEM_DISK_ARBITRATION: u32 = 0x368;

/// `kDAReturnNotPermitted`
pub const STATUS_NOT_PERMITTED: i32 = 0xF8DA_0008_u32 as i32;

const DISK_ARBITRATION_CODES: [&str; 13] = [
    "Success",
    "Undetermined error",
    "Resource is busy",
    "Bad argument",
    "Exclusive access to resource denied",
    "No resources available",
    "Not found",
    "Not mounted",
    "Not permitted",
    "Not enough privileges for this request",
    "Resource not ready",
    "Resource is not writable",
    "Unsupported",
];

fn system(status: u32) -> u32 {
    (status >> 26) & 0x3f
}

fn subsystem(status: u32) -> u32 {
    (status >> 14) & 0xfff
}

fn code(status: u32) -> u32 {
    status & 0x3fff
}

/// Render a platform failure as a human-readable description.
///
/// A platform-supplied message wins. Otherwise POSIX statuses render as
/// `errno N: <strerror>`, disk arbitration statuses through their fixed
/// table, and anything else as the raw status components.
pub fn decode_status(status: i32, message: Option<&str>) -> String {
    let raw = status as u32;
    let (system, subsystem, code) = (system(raw), subsystem(raw), code(raw));

    if let Some(message) = message.filter(|m| !m.is_empty()) {
        return format!("{message} (status {raw:#010x})");
    }

    if system == SYSTEM_KERNEL && subsystem == SUBSYSTEM_UNIX {
        return format!("errno {code}: {}", Errno::from_raw(code as i32).desc());
    }

    if system == SYSTEM_LOCAL && subsystem == SUBSYSTEM_DISK_ARBITRATION {
        return match DISK_ARBITRATION_CODES.get(code as usize) {
            Some(description) => format!("Disk arbitration error {code}: {description}"),
            None => format!("Disk arbitration error {code}: Unknown error"),
        };
    }

    format!(
        "Unknown error (status {raw:#010x}): system {system:#x}, subsystem {subsystem:#x}, code {code}"
    )
}
