// SPDX-License-Identifier: GPL-3.0-only

//! Recording fakes for the platform seam

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arbiter_contracts::{
    Approval, ArbitrationPlatform, Completion, DiskEventSink, Dissent, MountApprovalHandler,
    PlatformError, RawDisk, UnmountScope,
};
use arbiter_sys::{AttachError, ImageAttacher};
use arbiter_types::{AttachMode, DiskDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Mount,
    Unmount,
    Eject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    Mount {
        id: String,
        path: Option<PathBuf>,
        args: Vec<String>,
    },
    Unmount {
        id: String,
        scope: UnmountScope,
    },
    Eject {
        id: String,
    },
    RegisterApproval,
    UnregisterApproval,
}

type MountHook = Box<dyn Fn(&str) + Send + Sync>;
type RegisterHook = Box<dyn Fn(&dyn MountApprovalHandler) + Send + Sync>;

/// In-memory platform that records every native call and completes
/// requests from a separate thread, like the real dispatch context.
#[derive(Default)]
pub struct FakePlatform {
    descriptions: Mutex<HashMap<String, DiskDescription>>,
    outcomes: Mutex<HashMap<Operation, VecDeque<Dissent>>>,
    calls: Mutex<Vec<NativeCall>>,
    approval: Mutex<Option<Arc<dyn MountApprovalHandler>>>,
    sink: Mutex<Option<Arc<dyn DiskEventSink>>>,
    mount_hook: Mutex<Option<MountHook>>,
    register_hook: Mutex<Option<RegisterHook>>,
    reject_registration: AtomicBool,
    mounts_without_path: AtomicBool,
    stopped: AtomicBool,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_description(&self, id: &str, description: DiskDescription) {
        self.descriptions
            .lock()
            .unwrap()
            .insert(id.to_string(), description);
    }

    pub fn description(&self, id: &str) -> Option<DiskDescription> {
        self.descriptions.lock().unwrap().get(id).cloned()
    }

    /// Make the next request of kind `operation` complete with `dissent`.
    pub fn fail_next(&self, operation: Operation, dissent: Dissent) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(dissent);
    }

    /// Run `hook` with the disk identifier whenever a mount is issued.
    pub fn on_mount(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.mount_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Run `hook` with the handler right after it is registered, the way
    /// the host may ask for a decision before registration returns.
    pub fn on_register(&self, hook: impl Fn(&dyn MountApprovalHandler) + Send + Sync + 'static) {
        *self.register_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Refuse every approval handler registration.
    pub fn reject_registration(&self) {
        self.reject_registration.store(true, Ordering::SeqCst);
    }

    /// Report mounts as successful without the volume gaining a path.
    pub fn leave_mounts_without_path(&self) {
        self.mounts_without_path.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<NativeCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn approval_registered(&self) -> bool {
        self.approval.lock().unwrap().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Ask the registered approval handler about a mount, as the host does
    /// for every system-wide mount attempt. `None` when nothing is registered.
    pub fn request_mount_approval(&self, disk: &dyn RawDisk) -> Option<Approval> {
        let handler = self.approval.lock().unwrap().clone();
        handler.map(|handler| handler.approve_mount(disk))
    }

    pub fn sink(&self) -> Option<Arc<dyn DiskEventSink>> {
        self.sink.lock().unwrap().clone()
    }

    fn record(&self, call: NativeCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn ensure_known(&self, id: &str) -> Result<(), PlatformError> {
        if self.descriptions.lock().unwrap().contains_key(id) {
            Ok(())
        } else {
            Err(PlatformError::UnknownDisk(id.to_string()))
        }
    }

    fn complete(&self, operation: Operation, done: Completion, on_success: impl FnOnce(&Self)) {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);

        if outcome.is_none() {
            on_success(self);
        }
        std::thread::spawn(move || done(outcome));
    }
}

impl ArbitrationPlatform for FakePlatform {
    fn start(&self, sink: Arc<dyn DiskEventSink>) -> Result<(), PlatformError> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.sink.lock().unwrap().take();
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn register_approval(
        &self,
        handler: Arc<dyn MountApprovalHandler>,
    ) -> Result<(), PlatformError> {
        self.record(NativeCall::RegisterApproval);
        if self.reject_registration.load(Ordering::SeqCst) {
            return Err(PlatformError::Session(
                "Approval session could not be scheduled".to_string(),
            ));
        }

        *self.approval.lock().unwrap() = Some(handler.clone());
        if let Some(hook) = self.register_hook.lock().unwrap().as_ref() {
            hook(handler.as_ref());
        }
        Ok(())
    }

    fn unregister_approval(&self) -> Result<(), PlatformError> {
        self.record(NativeCall::UnregisterApproval);
        self.approval.lock().unwrap().take();
        Ok(())
    }

    fn describe(&self, id: &str) -> Result<DiskDescription, PlatformError> {
        self.description(id)
            .ok_or_else(|| PlatformError::UnknownDisk(id.to_string()))
    }

    fn mount(
        &self,
        id: &str,
        path: Option<&Path>,
        args: &[String],
        done: Completion,
    ) -> Result<(), PlatformError> {
        self.ensure_known(id)?;
        self.record(NativeCall::Mount {
            id: id.to_string(),
            path: path.map(Path::to_path_buf),
            args: args.to_vec(),
        });

        if let Some(hook) = self.mount_hook.lock().unwrap().as_ref() {
            hook(id);
        }

        let mount_path = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("/Volumes/{id}"));
        self.complete(Operation::Mount, done, |platform| {
            if platform.mounts_without_path.load(Ordering::SeqCst) {
                return;
            }
            if let Some(description) = platform.descriptions.lock().unwrap().get_mut(id) {
                description.volume_path = Some(mount_path);
            }
        });
        Ok(())
    }

    fn unmount(
        &self,
        id: &str,
        scope: UnmountScope,
        done: Completion,
    ) -> Result<(), PlatformError> {
        self.ensure_known(id)?;
        self.record(NativeCall::Unmount {
            id: id.to_string(),
            scope,
        });

        self.complete(Operation::Unmount, done, |platform| {
            let mut descriptions = platform.descriptions.lock().unwrap();
            for (disk, description) in descriptions.iter_mut() {
                let covered = disk == id
                    || (scope == UnmountScope::WholeDisk && disk.starts_with(&format!("{id}s")));
                if covered && description.volume_path.is_some() {
                    description.volume_path = Some(String::new());
                }
            }
        });
        Ok(())
    }

    fn eject(&self, id: &str, done: Completion) -> Result<(), PlatformError> {
        self.ensure_known(id)?;
        self.record(NativeCall::Eject { id: id.to_string() });
        self.complete(Operation::Eject, done, |_| {});
        Ok(())
    }
}

/// Disk handle as a platform callback would deliver it.
#[derive(Debug, Clone)]
pub struct FakeRawDisk {
    pub id: String,
    pub description: DiskDescription,
    pub whole: Option<Box<FakeRawDisk>>,
}

impl FakeRawDisk {
    pub fn whole(id: &str) -> Self {
        Self {
            id: id.to_string(),
            description: DiskDescription {
                media_bsd_name: Some(id.to_string()),
                media_whole: Some(true),
                media_ejectable: Some(true),
                ..Default::default()
            },
            whole: None,
        }
    }

    pub fn slice(id: &str, whole: &FakeRawDisk) -> Self {
        Self {
            id: id.to_string(),
            description: DiskDescription {
                media_bsd_name: Some(id.to_string()),
                media_whole: Some(false),
                volume_mountable: Some(true),
                ..Default::default()
            },
            whole: Some(Box::new(whole.clone())),
        }
    }

    pub fn with(mut self, update: impl FnOnce(&mut DiskDescription)) -> Self {
        update(&mut self.description);
        self
    }
}

impl RawDisk for FakeRawDisk {
    fn id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn description(&self) -> Result<DiskDescription, PlatformError> {
        Ok(self.description.clone())
    }

    fn whole_disk(&self) -> Option<Box<dyn RawDisk + '_>> {
        match &self.whole {
            Some(whole) => Some(Box::new((**whole).clone())),
            None => Some(Box::new(self.clone())),
        }
    }
}

/// Image attacher returning a canned result and counting invocations.
#[derive(Default)]
pub struct FakeAttacher {
    pub result: Mutex<Option<Result<Vec<String>, String>>>,
    pub calls: Mutex<Vec<(PathBuf, AttachMode, Option<String>)>>,
}

impl ImageAttacher for FakeAttacher {
    fn attach(
        &self,
        image: &Path,
        mode: AttachMode,
        passphrase: Option<&str>,
    ) -> arbiter_sys::Result<Vec<String>> {
        self.calls.lock().unwrap().push((
            image.to_path_buf(),
            mode,
            passphrase.map(str::to_string),
        ));
        match self.result.lock().unwrap().clone() {
            Some(Ok(disks)) => Ok(disks),
            Some(Err(message)) => Err(AttachError::InvalidState(message)),
            None => Ok(Vec::new()),
        }
    }
}
