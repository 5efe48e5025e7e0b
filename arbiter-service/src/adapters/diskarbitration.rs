// SPDX-License-Identifier: GPL-3.0-only

//! DiskArbitration framework adapter
//!
//! All framework objects live on one dispatch thread running the CF run
//! loop. Other threads talk to it through a command channel that the loop
//! drains between run loop slices; native completions and event callbacks
//! fire on the same thread.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_void};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arbiter_contracts::{
    Approval, ArbitrationPlatform, Completion, DiskEventSink, Dissent, MountApprovalHandler,
    PlatformError, RawDisk, UnmountScope,
};
use arbiter_types::DiskDescription;
use objc2_core_foundation::{
    CFArray, CFBoolean, CFData, CFDictionary, CFNumber, CFRetained, CFRunLoop, CFString, CFType,
    CFURL, CFUUID, ConcreteType, kCFRunLoopCommonModes, kCFRunLoopDefaultMode,
};
use objc2_disk_arbitration::{
    DAApprovalSession, DADisk, DADissenter, DARegisterDiskAppearedCallback,
    DARegisterDiskDescriptionChangedCallback, DARegisterDiskDisappearedCallback,
    DARegisterDiskMountApprovalCallback, DASession, DAUnregisterApprovalCallback,
    DAUnregisterCallback, kDADiskEjectOptionDefault, kDADiskMountOptionDefault,
    kDADiskUnmountOptionDefault, kDADiskUnmountOptionWhole,
};
use tracing::{debug, error, info, warn};

use super::translate;
use crate::bridge::status::STATUS_NOT_PERMITTED;

/// Longest the dispatch thread sleeps in the run loop before checking for
/// commands
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Reply<T> = Sender<Result<T, PlatformError>>;

enum Command {
    RegisterApproval(Arc<dyn MountApprovalHandler>, Reply<()>),
    UnregisterApproval(Reply<()>),
    Describe(String, Reply<DiskDescription>),
    Mount {
        id: String,
        path: Option<PathBuf>,
        args: Vec<String>,
        done: Completion,
        reply: Reply<()>,
    },
    Unmount {
        id: String,
        scope: UnmountScope,
        done: Completion,
        reply: Reply<()>,
    },
    Eject {
        id: String,
        done: Completion,
        reply: Reply<()>,
    },
    Stop,
}

struct Dispatch {
    commands: Sender<Command>,
    thread: JoinHandle<()>,
}

/// [`ArbitrationPlatform`] backed by the DiskArbitration framework
#[derive(Default)]
pub struct DiskArbitration {
    dispatch: Mutex<Option<Dispatch>>,
}

impl DiskArbitration {
    pub fn new() -> Self {
        Self::default()
    }

    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, PlatformError> {
        let (reply, response) = mpsc::channel();
        {
            let dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
            let dispatch = dispatch
                .as_ref()
                .ok_or_else(|| PlatformError::Session("Dispatch loop is not running".into()))?;

            if dispatch.thread.thread().id() == thread::current().id() {
                return Err(PlatformError::Session(
                    "Blocking platform call issued from the dispatch thread".into(),
                ));
            }

            dispatch
                .commands
                .send(make(reply))
                .map_err(|_| PlatformError::Session("Dispatch loop has exited".into()))?;
        }

        response
            .recv()
            .map_err(|_| PlatformError::Session("Dispatch loop dropped the request".into()))?
    }
}

impl ArbitrationPlatform for DiskArbitration {
    fn start(&self, sink: Arc<dyn DiskEventSink>) -> Result<(), PlatformError> {
        let mut dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        if dispatch.is_some() {
            return Err(PlatformError::Session("Dispatch loop already running".into()));
        }

        let (commands, receiver) = mpsc::channel();
        let (ready, started) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("da-dispatch".into())
            .spawn(move || run_dispatch(sink, receiver, ready))
            .map_err(|e| PlatformError::Session(format!("Failed to spawn dispatch thread: {e}")))?;

        started
            .recv()
            .map_err(|_| PlatformError::Session("Dispatch thread exited during startup".into()))??;

        *dispatch = Some(Dispatch { commands, thread });
        Ok(())
    }

    fn stop(&self) {
        let dispatch = self
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(dispatch) = dispatch {
            let _ = dispatch.commands.send(Command::Stop);
            if dispatch.thread.join().is_err() {
                error!("Dispatch thread panicked");
            }
        }
    }

    fn register_approval(
        &self,
        handler: Arc<dyn MountApprovalHandler>,
    ) -> Result<(), PlatformError> {
        self.call(|reply| Command::RegisterApproval(handler, reply))
    }

    fn unregister_approval(&self) -> Result<(), PlatformError> {
        self.call(Command::UnregisterApproval)
    }

    fn describe(&self, id: &str) -> Result<DiskDescription, PlatformError> {
        self.call(|reply| Command::Describe(id.to_string(), reply))
    }

    fn mount(
        &self,
        id: &str,
        path: Option<&Path>,
        args: &[String],
        done: Completion,
    ) -> Result<(), PlatformError> {
        self.call(|reply| Command::Mount {
            id: id.to_string(),
            path: path.map(Path::to_path_buf),
            args: args.to_vec(),
            done,
            reply,
        })
    }

    fn unmount(
        &self,
        id: &str,
        scope: UnmountScope,
        done: Completion,
    ) -> Result<(), PlatformError> {
        self.call(|reply| Command::Unmount {
            id: id.to_string(),
            scope,
            done,
            reply,
        })
    }

    fn eject(&self, id: &str, done: Completion) -> Result<(), PlatformError> {
        self.call(|reply| Command::Eject {
            id: id.to_string(),
            done,
            reply,
        })
    }
}

/// State owned by the dispatch thread, handed to callbacks as context
struct Dispatcher {
    session: CFRetained<DASession>,
    approval_session: CFRetained<DAApprovalSession>,
    sink: Arc<dyn DiskEventSink>,
    approval: RefCell<Option<Arc<dyn MountApprovalHandler>>>,
}

fn run_dispatch(
    sink: Arc<dyn DiskEventSink>,
    commands: Receiver<Command>,
    ready: Sender<Result<(), PlatformError>>,
) {
    let dispatcher = match Dispatcher::new(sink) {
        Ok(dispatcher) => dispatcher,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let Some(run_loop) = CFRunLoop::current() else {
        let _ = ready.send(Err(PlatformError::Session("No run loop for dispatch thread".into())));
        return;
    };

    // SAFETY: the common modes constant is provided by CoreFoundation.
    let Some(modes) = (unsafe { kCFRunLoopCommonModes }) else {
        let _ = ready.send(Err(PlatformError::Session("Run loop modes unavailable".into())));
        return;
    };
    // SAFETY: both sessions are retained by `dispatcher` and unscheduled
    // before it is dropped.
    unsafe {
        dispatcher.session.schedule_with_run_loop(&run_loop, modes);
        dispatcher
            .approval_session
            .schedule_with_run_loop(&run_loop, modes);
    }

    let context = &dispatcher as *const Dispatcher as *mut c_void;
    if let Err(err) = dispatcher.register_events(context) {
        let _ = ready.send(Err(err));
        return;
    }

    info!("Disk arbitration dispatch loop starting");
    let _ = ready.send(Ok(()));

    // SAFETY: the default mode constant is provided by CoreFoundation.
    let slice_mode = unsafe { kCFRunLoopDefaultMode };
    'dispatch: loop {
        while let Ok(command) = commands.try_recv() {
            if matches!(command, Command::Stop) {
                break 'dispatch;
            }
            dispatcher.handle(command, context);
        }
        CFRunLoop::run_in_mode(slice_mode, POLL_INTERVAL.as_secs_f64(), true);
    }

    dispatcher.unregister(context);
    // SAFETY: same run loop and modes the sessions were scheduled with.
    unsafe {
        dispatcher.session.unschedule_from_run_loop(&run_loop, modes);
        dispatcher
            .approval_session
            .unschedule_from_run_loop(&run_loop, modes);
    }
    info!("Disk arbitration dispatch loop terminated");
}

impl Dispatcher {
    fn new(sink: Arc<dyn DiskEventSink>) -> Result<Self, PlatformError> {
        // SAFETY: default allocator.
        let session = unsafe { DASession::new(None) }
            .ok_or_else(|| PlatformError::Session("Failed to create session".into()))?;
        // SAFETY: default allocator.
        let approval_session = unsafe { DAApprovalSession::new(None) }
            .ok_or_else(|| PlatformError::Session("Failed to create approval session".into()))?;

        Ok(Self {
            session,
            approval_session,
            sink,
            approval: RefCell::new(None),
        })
    }

    fn register_events(&self, context: *mut c_void) -> Result<(), PlatformError> {
        // Network volumes are not ours to track
        let key = CFString::from_static_str("DAVolumeNetwork");
        let matching = CFDictionary::<CFString, CFBoolean>::from_slices(
            &[&*key],
            &[CFBoolean::new(false)],
        );
        let matching = matching.as_opaque();

        // SAFETY: `context` points at `self`, which outlives the
        // registrations; they are removed in `unregister`.
        unsafe {
            DARegisterDiskAppearedCallback(
                &self.session,
                Some(matching),
                Some(disk_appeared),
                context,
            );
            DARegisterDiskDisappearedCallback(
                &self.session,
                Some(matching),
                Some(disk_disappeared),
                context,
            );
            DARegisterDiskDescriptionChangedCallback(
                &self.session,
                Some(matching),
                None,
                Some(disk_description_changed),
                context,
            );
        }
        Ok(())
    }

    fn unregister(&self, context: *mut c_void) {
        if self.approval.borrow_mut().take().is_some() {
            self.unregister_approval_callback(context);
        }

        let callbacks = [
            disk_appeared as *const c_void,
            disk_disappeared as *const c_void,
            disk_description_changed as *const c_void,
        ];
        for callback in callbacks {
            if let Some(callback) = NonNull::new(callback as *mut c_void) {
                // SAFETY: the callback was registered with the same context.
                unsafe { DAUnregisterCallback(&self.session, callback, context) };
            }
        }
    }

    fn unregister_approval_callback(&self, context: *mut c_void) {
        if let Some(callback) = NonNull::new(approve_mount as *const c_void as *mut c_void) {
            // SAFETY: the callback was registered with the same context.
            unsafe { DAUnregisterApprovalCallback(&self.approval_session, callback, context) };
        }
    }

    fn disk(&self, id: &str) -> Result<CFRetained<DADisk>, PlatformError> {
        let name = CString::new(id).map_err(|_| PlatformError::UnknownDisk(id.to_string()))?;
        let name = NonNull::new(name.as_ptr() as *mut _)
            .ok_or_else(|| PlatformError::UnknownDisk(id.to_string()))?;

        // SAFETY: `name` is a valid NUL-terminated string for this call.
        unsafe { DADisk::from_bsd_name(None, &self.session, name) }
            .ok_or_else(|| PlatformError::UnknownDisk(id.to_string()))
    }

    fn handle(&self, command: Command, context: *mut c_void) {
        match command {
            Command::RegisterApproval(handler, reply) => {
                let first = self.approval.borrow_mut().replace(handler).is_none();
                if first {
                    // SAFETY: `context` outlives the registration.
                    unsafe {
                        DARegisterDiskMountApprovalCallback(
                            &self.approval_session,
                            None,
                            Some(approve_mount),
                            context,
                        );
                    }
                    debug!("Mount approval callback registered");
                }
                let _ = reply.send(Ok(()));
            }
            Command::UnregisterApproval(reply) => {
                if self.approval.borrow_mut().take().is_some() {
                    self.unregister_approval_callback(context);
                    debug!("Mount approval callback unregistered");
                }
                let _ = reply.send(Ok(()));
            }
            Command::Describe(id, reply) => {
                let result = self.disk(&id).and_then(|disk| NativeDisk(disk).description());
                let _ = reply.send(result);
            }
            Command::Mount {
                id,
                path,
                args,
                done,
                reply,
            } => {
                let _ = reply.send(self.mount(&id, path.as_deref(), &args, done));
            }
            Command::Unmount {
                id,
                scope,
                done,
                reply,
            } => {
                let result = self.disk(&id).map(|disk| {
                    let options = match scope {
                        UnmountScope::Volume => kDADiskUnmountOptionDefault,
                        UnmountScope::WholeDisk => kDADiskUnmountOptionWhole,
                    };
                    // SAFETY: the completion context is reclaimed exactly
                    // once by `operation_done`.
                    unsafe { disk.unmount(options, Some(operation_done), completion_context(done)) };
                });
                let _ = reply.send(result);
            }
            Command::Eject { id, done, reply } => {
                let result = self.disk(&id).map(|disk| {
                    // SAFETY: as for unmount.
                    unsafe {
                        disk.eject(
                            kDADiskEjectOptionDefault,
                            Some(operation_done),
                            completion_context(done),
                        )
                    };
                });
                let _ = reply.send(result);
            }
            Command::Stop => {}
        }
    }

    fn mount(
        &self,
        id: &str,
        path: Option<&Path>,
        args: &[String],
        done: Completion,
    ) -> Result<(), PlatformError> {
        let disk = self.disk(id)?;

        let url = match path {
            Some(path) => Some(CFURL::from_file_path(path).ok_or_else(|| {
                PlatformError::Failed(format!("Invalid mount path {}", path.display()))
            })?),
            None => None,
        };

        let arguments: Vec<CFRetained<CFString>> =
            args.iter().map(|arg| CFString::from_str(arg)).collect();
        let mut argv: Vec<*const CFString> = arguments
            .iter()
            .map(|arg| &**arg as *const CFString)
            .collect();
        argv.push(ptr::null());

        // SAFETY: `argv` is NULL-terminated and, with `arguments`, outlives
        // the call; the completion context is reclaimed by `operation_done`.
        unsafe {
            disk.mount_with_arguments(
                url.as_deref(),
                kDADiskMountOptionDefault,
                Some(operation_done),
                completion_context(done),
                argv.as_mut_ptr().cast(),
            );
        }
        Ok(())
    }
}

fn completion_context(done: Completion) -> *mut c_void {
    Box::into_raw(Box::new(done)).cast()
}

/// # Safety
/// `dissenter` must be null or a valid dissenter for the call's duration.
unsafe fn dissent_from(dissenter: *const DADissenter) -> Option<Dissent> {
    // SAFETY: guaranteed by the caller.
    let dissenter = unsafe { dissenter.as_ref() }?;
    let message = dissenter.status_string().map(|s| s.to_string());
    Some(Dissent::new(dissenter.status(), message))
}

unsafe extern "C-unwind" fn operation_done(
    _disk: NonNull<DADisk>,
    dissenter: *const DADissenter,
    context: *mut c_void,
) {
    // SAFETY: `context` came from `completion_context` and the framework
    // calls each completion exactly once.
    let done = unsafe { Box::from_raw(context.cast::<Completion>()) };
    // SAFETY: provided by the framework.
    done(unsafe { dissent_from(dissenter) });
}

/// # Safety
/// `context` must point at the live [`Dispatcher`].
unsafe fn dispatcher<'a>(context: *mut c_void) -> &'a Dispatcher {
    // SAFETY: guaranteed by the caller.
    unsafe { &*context.cast::<Dispatcher>() }
}

unsafe extern "C-unwind" fn disk_appeared(disk: NonNull<DADisk>, context: *mut c_void) {
    // SAFETY: registered with the dispatcher as context.
    let dispatcher = unsafe { dispatcher(context) };
    // SAFETY: the framework passes a valid disk.
    let disk = NativeDisk(unsafe { CFRetained::retain(disk) });
    dispatcher.sink.disk_appeared(&disk);
}

unsafe extern "C-unwind" fn disk_disappeared(disk: NonNull<DADisk>, context: *mut c_void) {
    // SAFETY: registered with the dispatcher as context.
    let dispatcher = unsafe { dispatcher(context) };
    // SAFETY: the framework passes a valid disk.
    let disk = NativeDisk(unsafe { CFRetained::retain(disk) });
    dispatcher.sink.disk_disappeared(&disk);
}

unsafe extern "C-unwind" fn disk_description_changed(
    disk: NonNull<DADisk>,
    _keys: NonNull<CFArray>,
    context: *mut c_void,
) {
    // SAFETY: registered with the dispatcher as context.
    let dispatcher = unsafe { dispatcher(context) };
    // SAFETY: the framework passes a valid disk.
    let disk = NativeDisk(unsafe { CFRetained::retain(disk) });
    dispatcher.sink.disk_description_changed(&disk);
}

unsafe extern "C-unwind" fn approve_mount(
    disk: NonNull<DADisk>,
    context: *mut c_void,
) -> *const DADissenter {
    // SAFETY: registered with the dispatcher as context.
    let dispatcher = unsafe { dispatcher(context) };
    let Some(handler) = dispatcher.approval.borrow().clone() else {
        return ptr::null();
    };

    // SAFETY: the framework passes a valid disk.
    let disk = NativeDisk(unsafe { CFRetained::retain(disk) });
    match handler.approve_mount(&disk) {
        Approval::Allow => ptr::null(),
        Approval::Deny(message) => {
            let message = CFString::from_str(&message);
            // SAFETY: default allocator; the framework releases the
            // returned dissenter.
            let dissenter =
                unsafe { DADissenter::new(None, STATUS_NOT_PERMITTED, Some(&message)) };
            CFRetained::into_raw(dissenter).as_ptr()
        }
    }
}

/// Retained framework disk handle
struct NativeDisk(CFRetained<DADisk>);

impl RawDisk for NativeDisk {
    fn id(&self) -> Option<String> {
        // SAFETY: the BSD name is owned by the disk object.
        let name = unsafe { self.0.bsd_name() };
        if name.is_null() {
            return None;
        }
        // SAFETY: non-null, NUL-terminated and valid while `self` lives.
        Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }

    fn description(&self) -> Result<DiskDescription, PlatformError> {
        // SAFETY: valid disk handle.
        let dict = unsafe { self.0.description() }
            .ok_or_else(|| PlatformError::Failed("Disk has no description".into()))?;
        Ok(translate_description(&dict))
    }

    fn whole_disk(&self) -> Option<Box<dyn RawDisk + '_>> {
        // SAFETY: valid disk handle.
        let whole = unsafe { self.0.whole_disk() }?;
        Some(Box::new(NativeDisk(whole)))
    }
}

fn lookup<'a, T: ConcreteType>(dict: &'a CFDictionary, key: &str) -> Option<&'a T> {
    let key = CFString::from_str(key);
    // SAFETY: `key` is a valid CFString for the lookup.
    let raw = unsafe { dict.value((&*key as *const CFString).cast()) };
    // SAFETY: dictionary values are CF objects owned by `dict`.
    let value = unsafe { raw.cast::<CFType>().as_ref() }?;
    value.downcast_ref::<T>()
}

fn string(dict: &CFDictionary, key: &str) -> Option<String> {
    lookup::<CFString>(dict, key).map(|s| s.to_string())
}

fn boolean(dict: &CFDictionary, key: &str) -> Option<bool> {
    lookup::<CFBoolean>(dict, key).map(CFBoolean::as_bool)
}

fn number(dict: &CFDictionary, key: &str) -> Option<u64> {
    lookup::<CFNumber>(dict, key)
        .and_then(CFNumber::as_i64)
        .and_then(|n| u64::try_from(n).ok())
}

fn uuid(dict: &CFDictionary, key: &str) -> Option<String> {
    let uuid = lookup::<CFUUID>(dict, key)?;
    // SAFETY: valid UUID, default allocator.
    unsafe { CFUUID::new_string(None, Some(uuid)) }.map(|s| s.to_string())
}

fn media_icon(dict: &CFDictionary) -> std::collections::BTreeMap<String, String> {
    let Some(icon) = lookup::<CFDictionary>(dict, "DAMediaIcon") else {
        return Default::default();
    };
    translate::media_icon(
        string(icon, translate::ICON_BUNDLE_KEY),
        string(icon, translate::ICON_RESOURCE_KEY),
    )
}

fn translate_description(dict: &CFDictionary) -> DiskDescription {
    let appearance_time = lookup::<CFNumber>(dict, "DAAppearanceTime")
        .and_then(CFNumber::as_f64)
        .map(translate::reference_time_to_unix);

    let volume_path = lookup::<CFURL>(dict, "DAVolumePath")
        .and_then(CFURL::to_file_path)
        .map(|path| path.to_string_lossy().into_owned());

    let device_guid = lookup::<CFData>(dict, "DADeviceGUID")
        .and_then(|data| translate::format_guid(&data.to_vec()));

    if volume_path.is_none() && lookup::<CFType>(dict, "DAVolumePath").is_some() {
        warn!("Volume path is not a file URL, ignoring");
    }

    DiskDescription {
        appearance_time,
        media_bsd_name: string(dict, "DAMediaBSDName"),
        media_whole: boolean(dict, "DAMediaWhole"),
        media_removable: boolean(dict, "DAMediaRemovable"),
        media_writable: boolean(dict, "DAMediaWritable"),
        media_ejectable: boolean(dict, "DAMediaEjectable"),
        media_leaf: boolean(dict, "DAMediaLeaf"),
        media_name: string(dict, "DAMediaName"),
        media_kind: string(dict, "DAMediaKind"),
        media_path: string(dict, "DAMediaPath"),
        media_type: string(dict, "DAMediaType"),
        media_uuid: uuid(dict, "DAMediaUUID"),
        media_content: string(dict, "DAMediaContent"),
        media_size: number(dict, "DAMediaSize"),
        media_block_size: number(dict, "DAMediaBlockSize"),
        media_bsd_major: number(dict, "DAMediaBSDMajor"),
        media_bsd_minor: number(dict, "DAMediaBSDMinor"),
        media_bsd_unit: number(dict, "DAMediaBSDUnit"),
        media_icon: media_icon(dict),
        volume_name: string(dict, "DAVolumeName"),
        volume_kind: string(dict, "DAVolumeKind"),
        volume_path,
        volume_uuid: uuid(dict, "DAVolumeUUID"),
        volume_mountable: boolean(dict, "DAVolumeMountable"),
        volume_network: boolean(dict, "DAVolumeNetwork"),
        device_vendor: string(dict, "DADeviceVendor"),
        device_model: string(dict, "DADeviceModel"),
        device_guid,
        device_protocol: string(dict, "DADeviceProtocol"),
        device_path: string(dict, "DADevicePath"),
        device_revision: string(dict, "DADeviceRevision"),
        device_unit: number(dict, "DADeviceUnit"),
        device_internal: boolean(dict, "DADeviceInternal"),
        bus_name: string(dict, "DABusName"),
        bus_path: string(dict, "DABusPath"),
    }
}
