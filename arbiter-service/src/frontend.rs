// SPDX-License-Identifier: GPL-3.0-only

//! Operations exposed over RPC, independent of the transport
//!
//! Every method blocks: disk operations wait on platform completions and
//! attach waits on the image utility. Handlers call them from the blocking
//! pool.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use arbiter_contracts::ArbitrationPlatform;
use arbiter_sys::ImageAttacher;
use arbiter_types::{
    ArbitrationMode, AttachMode, Disk, DiskDescription, MountMode, order_hierarchically,
};

use crate::bridge::OperationBridge;
use crate::error::{Result, ServiceError};
use crate::policies::ArbitrationEngine;
use crate::state::SharedState;

pub struct ArbiterFrontend {
    state: SharedState,
    bridge: OperationBridge,
    engine: Arc<ArbitrationEngine>,
    attacher: Arc<dyn ImageAttacher>,
}

impl ArbiterFrontend {
    pub fn new(
        state: SharedState,
        platform: Arc<dyn ArbitrationPlatform>,
        engine: Arc<ArbitrationEngine>,
        attacher: Arc<dyn ImageAttacher>,
    ) -> Self {
        Self {
            state,
            bridge: OperationBridge::new(platform),
            engine,
            attacher,
        }
    }

    /// Copy of a registered disk, `NotFound` if the registry does not know it.
    fn resolve(&self, disk_id: &str) -> Result<Disk> {
        self.state
            .lock()
            .registry
            .get(disk_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(disk_id.to_string()))
    }

    /// Every registered disk, whole disks first with their slices after
    /// them. Disks outside that hierarchy follow in identifier order.
    pub fn list_disks(&self) -> Vec<Disk> {
        let snapshot = self.state.lock().registry.snapshot();

        let mut listed: Vec<Disk> = order_hierarchically(&snapshot)
            .into_iter()
            .cloned()
            .collect();
        let seen: HashSet<String> = listed.iter().map(|d| d.id.clone()).collect();
        listed.extend(snapshot.into_iter().filter(|d| !seen.contains(&d.id)));
        listed
    }

    pub fn disk_info(&self, disk_id: &str) -> Result<DiskDescription> {
        Ok(self.resolve(disk_id)?.description)
    }

    pub fn mount_disk(
        &self,
        disk_id: &str,
        mode: MountMode,
        args: &[String],
        path: Option<&Path>,
    ) -> Result<String> {
        let disk = self.resolve(disk_id)?;

        // Our own mounts must pass arbitration
        let _marker = self.state.mark_self_mount(disk_id);
        Ok(self.bridge.mount(&disk, mode, args, path)?)
    }

    pub fn unmount_disk(&self, disk_id: &str) -> Result<()> {
        let disk = self.resolve(disk_id)?;
        Ok(self.bridge.unmount(&disk)?)
    }

    pub fn eject_disk(&self, disk_id: &str) -> Result<()> {
        let disk = self.resolve(disk_id)?;
        Ok(self.bridge.eject(&disk)?)
    }

    pub fn attach_disk(
        &self,
        image: &Path,
        mode: AttachMode,
        password: Option<&str>,
    ) -> Result<Vec<String>> {
        Ok(self.attacher.attach(image, mode, password)?)
    }

    pub fn arbitrate(&self, mode: ArbitrationMode) -> Result<()> {
        Ok(self.engine.set_mode(mode)?)
    }

    pub fn mode(&self) -> ArbitrationMode {
        self.engine.mode()
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{FakeAttacher, FakePlatform, NativeCall};
    use arbiter_contracts::{Approval, UnmountScope};

    pub(crate) struct Fixture {
        pub platform: Arc<FakePlatform>,
        pub attacher: Arc<FakeAttacher>,
        pub state: SharedState,
        pub frontend: Arc<ArbiterFrontend>,
    }

    pub(crate) fn fixture() -> Fixture {
        let platform = FakePlatform::new();
        let attacher = Arc::new(FakeAttacher::default());
        let state = SharedState::new();
        let engine = ArbitrationEngine::new(state.clone(), platform.clone());
        let frontend = Arc::new(ArbiterFrontend::new(
            state.clone(),
            platform.clone(),
            engine,
            attacher.clone(),
        ));
        Fixture {
            platform,
            attacher,
            state,
            frontend,
        }
    }

    /// Register a whole disk with one mountable slice on both sides.
    pub(crate) fn register(fixture: &Fixture, whole: &str, slice: &str) {
        let whole_description = DiskDescription {
            media_bsd_name: Some(whole.to_string()),
            media_whole: Some(true),
            media_ejectable: Some(true),
            ..Default::default()
        };
        let slice_description = DiskDescription {
            media_bsd_name: Some(slice.to_string()),
            media_whole: Some(false),
            volume_mountable: Some(true),
            volume_kind: Some("apfs".to_string()),
            ..Default::default()
        };

        fixture
            .platform
            .set_description(whole, whole_description.clone());
        fixture
            .platform
            .set_description(slice, slice_description.clone());

        let mut state = fixture.state.lock();
        state.registry.upsert(Disk::new(whole, whole_description));
        let mut child = Disk::new(slice, slice_description);
        child.parent = Some(whole.to_string());
        state.registry.upsert(child);
        state.registry.link_child(slice, whole).unwrap();
    }

    #[test]
    fn list_disks_orders_hierarchically() {
        let f = fixture();
        register(&f, "disk3", "disk3s1");
        register(&f, "disk2", "disk2s1");
        f.state.lock().registry.upsert(Disk::new("disk9s1", DiskDescription::default()));

        let ids: Vec<String> = f.frontend.list_disks().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["disk2", "disk2s1", "disk3", "disk3s1", "disk9s1"]);
    }

    #[test]
    fn unknown_disk_is_not_found_without_native_call() {
        let f = fixture();

        assert!(matches!(f.frontend.disk_info("disk7"), Err(ServiceError::NotFound(_))));
        assert!(matches!(
            f.frontend.mount_disk("disk7", MountMode::ReadWrite, &[], None),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(f.frontend.unmount_disk("disk7"), Err(ServiceError::NotFound(_))));
        assert!(matches!(f.frontend.eject_disk("disk7"), Err(ServiceError::NotFound(_))));
        assert!(f.platform.calls().is_empty());
    }

    #[test]
    fn operator_mount_passes_block_mode() {
        let f = fixture();
        register(&f, "disk2", "disk2s1");
        f.frontend.arbitrate(ArbitrationMode::Block).unwrap();

        let platform = f.platform.clone();
        let seen = Arc::new(std::sync::Mutex::new(None));
        f.platform.on_mount({
            let seen = seen.clone();
            move |id| {
                let disk = crate::testing::FakeRawDisk::whole(id);
                *seen.lock().unwrap() = platform.request_mount_approval(&disk);
            }
        });

        let path = f
            .frontend
            .mount_disk("disk2s1", MountMode::ReadWrite, &[], None)
            .unwrap();

        assert_eq!(path, "/Volumes/disk2s1");
        assert_eq!(*seen.lock().unwrap(), Some(Approval::Allow));
        assert!(!f.state.is_self_mount("disk2s1"));
    }

    #[test]
    fn eject_unmounts_children_first() {
        let f = fixture();
        register(&f, "disk5", "disk5s1");

        f.frontend.eject_disk("disk5").unwrap();

        assert_eq!(
            f.platform.take_calls(),
            vec![
                NativeCall::Unmount {
                    id: "disk5".to_string(),
                    scope: UnmountScope::WholeDisk
                },
                NativeCall::Eject {
                    id: "disk5".to_string()
                },
            ]
        );
    }

    #[test]
    fn attach_forwards_to_driver() {
        let f = fixture();
        *f.attacher.result.lock().unwrap() = Some(Ok(vec!["disk8".into(), "disk8s1".into()]));

        let disks = f
            .frontend
            .attach_disk(Path::new("/tmp/image.dmg"), AttachMode::ReadOnly, Some("secret"))
            .unwrap();

        assert_eq!(disks, vec!["disk8", "disk8s1"]);
        assert_eq!(
            f.attacher.calls.lock().unwrap()[0],
            (
                Path::new("/tmp/image.dmg").to_path_buf(),
                AttachMode::ReadOnly,
                Some("secret".to_string())
            )
        );
    }

    #[test]
    fn arbitrate_reports_repeated_mode() {
        let f = fixture();
        f.frontend.arbitrate(ArbitrationMode::ForceReadOnly).unwrap();
        assert_eq!(f.frontend.mode(), ArbitrationMode::ForceReadOnly);

        assert!(matches!(
            f.frontend.arbitrate(ArbitrationMode::ForceReadOnly),
            Err(ServiceError::Arbitration(_))
        ));

        f.frontend.shutdown();
        assert_eq!(f.frontend.mode(), ArbitrationMode::Disabled);
    }
}
