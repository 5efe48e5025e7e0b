// SPDX-License-Identifier: GPL-3.0-only

//! Conversions from native disk description values

use std::collections::BTreeMap;
use std::fmt::Write;

use tracing::warn;

/// Seconds between the Unix epoch and the platform reference date (2001-01-01)
pub const REFERENCE_DATE_OFFSET: u64 = 978_307_200;

pub const ICON_BUNDLE_KEY: &str = "CFBundleIdentifier";
pub const ICON_RESOURCE_KEY: &str = "IOBundleResourceFile";

/// Seconds since the reference date to Unix seconds.
pub fn reference_time_to_unix(seconds: f64) -> u64 {
    (seconds.max(0.0) as u64).saturating_add(REFERENCE_DATE_OFFSET)
}

/// Format raw GUID bytes as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
///
/// Returns `None` when there are fewer than 16 bytes.
pub fn format_guid(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 16 {
        return None;
    }

    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }

    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

/// Media icon map, kept only when both identifying strings are present.
pub fn media_icon(
    bundle_identifier: Option<String>,
    resource_file: Option<String>,
) -> BTreeMap<String, String> {
    match (bundle_identifier, resource_file) {
        (Some(bundle), Some(resource)) => BTreeMap::from([
            (ICON_BUNDLE_KEY.to_string(), bundle),
            (ICON_RESOURCE_KEY.to_string(), resource),
        ]),
        _ => {
            warn!("Media icon is missing expected keys, skipping");
            BTreeMap::new()
        }
    }
}
