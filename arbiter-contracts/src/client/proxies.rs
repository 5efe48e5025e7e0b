// SPDX-License-Identifier: GPL-3.0-only

use zbus::proxy;

use crate::protocol::ArbiterError;

/// D-Bus proxy for the daemon root object
#[proxy(
    interface = "org.diskarbiter.Arbiter",
    default_path = "/org/diskarbiter/Arbiter"
)]
pub trait ArbiterInterface {
    /// Daemon version
    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

/// D-Bus proxy for disk inventory and explicit disk operations
#[proxy(
    interface = "org.diskarbiter.Arbiter.Disks",
    default_path = "/org/diskarbiter/Arbiter/disks"
)]
pub trait DisksInterface {
    /// JSON array of `Disk`
    async fn list_disks(&self) -> Result<String, ArbiterError>;

    /// JSON `DiskDescription`
    async fn disk_info(&self, disk_id: &str) -> Result<String, ArbiterError>;

    /// Returns the mount path. An empty `path` lets the platform choose.
    async fn mount_disk(
        &self,
        disk_id: &str,
        mode: &str,
        args: &[&str],
        path: &str,
    ) -> Result<String, ArbiterError>;

    async fn unmount_disk(&self, disk_id: &str) -> Result<(), ArbiterError>;

    async fn eject_disk(&self, disk_id: &str) -> Result<(), ArbiterError>;
}

/// D-Bus proxy for disk image attach
#[proxy(
    interface = "org.diskarbiter.Arbiter.Image",
    default_path = "/org/diskarbiter/Arbiter/image"
)]
pub trait ImageInterface {
    /// Returns the attached disk identifiers. An empty `password` means none.
    async fn attach_disk(
        &self,
        image_path: &str,
        mode: &str,
        password: &str,
    ) -> Result<Vec<String>, ArbiterError>;
}

/// D-Bus proxy for the mount arbitration policy
#[proxy(
    interface = "org.diskarbiter.Arbiter.Arbitration",
    default_path = "/org/diskarbiter/Arbiter/arbitration"
)]
pub trait ArbitrationInterface {
    async fn arbitrate(&self, mode: &str) -> Result<(), ArbiterError>;

    /// Current arbitration mode
    #[zbus(property)]
    fn mode(&self) -> zbus::Result<String>;
}
