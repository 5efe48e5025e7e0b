// SPDX-License-Identifier: GPL-3.0-only

//! Disk data models
//!
//! These types represent the canonical domain model for disk information.
//! The platform adapter fills a `DiskDescription`, the registry wraps it
//! in a `Disk` with hierarchy links, and clients receive both over RPC.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Descriptive attributes reported by the platform for one disk.
///
/// Every attribute is optional: the platform only reports keys that apply
/// to the media, and several operations distinguish "not reported" from
/// "reported as false/empty".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskDescription {
    /// Seconds since the Unix epoch at which the disk appeared
    pub appearance_time: Option<u64>,

    // === Media ===
    /// BSD device name (e.g., "disk2s1")
    pub media_bsd_name: Option<String>,

    /// Whether this entry represents the whole device rather than a slice
    pub media_whole: Option<bool>,

    pub media_removable: Option<bool>,

    pub media_writable: Option<bool>,

    pub media_ejectable: Option<bool>,

    /// Whether the media has no further partitioning
    pub media_leaf: Option<bool>,

    pub media_name: Option<String>,

    pub media_kind: Option<String>,

    pub media_path: Option<String>,

    pub media_type: Option<String>,

    pub media_uuid: Option<String>,

    /// Partition scheme or content hint (e.g., "GUID_partition_scheme")
    pub media_content: Option<String>,

    /// Total size in bytes
    pub media_size: Option<u64>,

    pub media_block_size: Option<u64>,

    pub media_bsd_major: Option<u64>,

    pub media_bsd_minor: Option<u64>,

    pub media_bsd_unit: Option<u64>,

    /// Icon metadata (`CFBundleIdentifier`, `IOBundleResourceFile`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub media_icon: BTreeMap<String, String>,

    // === Volume ===
    pub volume_name: Option<String>,

    /// Filesystem kind (e.g., "apfs", "hfs", "msdos")
    pub volume_kind: Option<String>,

    /// Mount point. Present-but-empty marks a volume known to be unmounted.
    pub volume_path: Option<String>,

    pub volume_uuid: Option<String>,

    pub volume_mountable: Option<bool>,

    pub volume_network: Option<bool>,

    // === Device ===
    pub device_vendor: Option<String>,

    pub device_model: Option<String>,

    /// GUID formatted as 8-4-4-4-12 hex groups
    pub device_guid: Option<String>,

    pub device_protocol: Option<String>,

    pub device_path: Option<String>,

    pub device_revision: Option<String>,

    pub device_unit: Option<u64>,

    pub device_internal: Option<bool>,

    // === Bus ===
    pub bus_name: Option<String>,

    pub bus_path: Option<String>,
}

impl DiskDescription {
    /// True when the platform flags this entry as a whole disk.
    pub fn is_whole(&self) -> bool {
        self.media_whole.unwrap_or(false)
    }

    /// The current mount point, if the volume is mounted.
    pub fn mount_path(&self) -> Option<&str> {
        self.volume_path.as_deref().filter(|path| !path.is_empty())
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_path().is_some()
    }
}

/// A disk known to the registry, with its place in the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Disk {
    /// Platform-stable device identifier (BSD name, e.g. "disk2s1")
    pub id: String,

    /// Identifier of the whole disk this slice belongs to
    pub parent: Option<String>,

    /// Identifiers of the slices of this disk, in link order
    pub children: Vec<String>,

    pub description: DiskDescription,
}

impl Disk {
    pub fn new(id: impl Into<String>, description: DiskDescription) -> Self {
        Self {
            id: id.into(),
            parent: None,
            children: Vec::new(),
            description,
        }
    }

    pub fn is_whole(&self) -> bool {
        self.description.is_whole()
    }

    /// Children identifiers in lexicographic order.
    pub fn sorted_children(&self) -> Vec<&str> {
        let mut children: Vec<&str> = self.children.iter().map(String::as_str).collect();
        children.sort_unstable();
        children
    }
}

/// Flatten disks into listing order: each whole disk followed by its
/// children sorted by identifier.
///
/// Whole disks keep their relative input order. Children that are not
/// present in `disks` are skipped.
pub fn order_hierarchically(disks: &[Disk]) -> Vec<&Disk> {
    let by_id: BTreeMap<&str, &Disk> = disks.iter().map(|d| (d.id.as_str(), d)).collect();

    let mut ordered = Vec::with_capacity(disks.len());
    for whole in disks.iter().filter(|d| d.is_whole()) {
        ordered.push(whole);
        for child in whole.sorted_children() {
            if let Some(disk) = by_id.get(child) {
                ordered.push(*disk);
            }
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whole(id: &str, children: &[&str]) -> Disk {
        let mut disk = Disk::new(
            id,
            DiskDescription {
                media_whole: Some(true),
                ..Default::default()
            },
        );
        disk.children = children.iter().map(|c| c.to_string()).collect();
        disk
    }

    fn slice(id: &str, parent: &str) -> Disk {
        let mut disk = Disk::new(
            id,
            DiskDescription {
                media_whole: Some(false),
                ..Default::default()
            },
        );
        disk.parent = Some(parent.to_string());
        disk
    }

    #[test]
    fn sorted_children_are_lexicographic() {
        let disk = whole("disk2", &["disk2s2", "disk2s1"]);
        assert_eq!(disk.sorted_children(), vec!["disk2s1", "disk2s2"]);
        // Link order itself is untouched
        assert_eq!(disk.children, vec!["disk2s2", "disk2s1"]);
    }

    #[test]
    fn hierarchy_places_children_after_their_whole_disk() {
        let disks = vec![
            slice("disk2s2", "disk2"),
            whole("disk2", &["disk2s2", "disk2s1"]),
            slice("disk2s1", "disk2"),
            whole("disk0", &["disk0s1"]),
            slice("disk0s1", "disk0"),
        ];

        let ids: Vec<&str> = order_hierarchically(&disks)
            .into_iter()
            .map(|d| d.id.as_str())
            .collect();

        assert_eq!(ids, vec!["disk2", "disk2s1", "disk2s2", "disk0", "disk0s1"]);
    }

    #[test]
    fn hierarchy_skips_unknown_children() {
        let disks = vec![whole("disk3", &["disk3s1"])];
        let ordered = order_hierarchically(&disks);
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn mount_path_ignores_empty_marker() {
        let mut description = DiskDescription::default();
        assert!(!description.is_mounted());

        description.volume_path = Some(String::new());
        assert_eq!(description.mount_path(), None);

        description.volume_path = Some("/Volumes/Data".to_string());
        assert_eq!(description.mount_path(), Some("/Volumes/Data"));
    }

    #[test]
    fn empty_icon_map_is_omitted_from_json() {
        let json = serde_json::to_string(&DiskDescription::default()).unwrap();
        assert!(!json.contains("media_icon"));

        let parsed: DiskDescription = serde_json::from_str(&json).unwrap();
        assert!(parsed.media_icon.is_empty());
    }
}
