// SPDX-License-Identifier: GPL-3.0-only

//! Platform disk events applied to the registry
//!
//! Runs on the dispatch thread. Descriptions are fetched before taking the
//! state lock so RPC threads never wait on platform queries.

use arbiter_contracts::{DiskEventSink, PlatformError, RawDisk};
use arbiter_types::Disk;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::registry::RegistryError;
use crate::state::SharedState;

#[derive(Debug, Error)]
enum EventError {
    #[error("Disk reported by the platform has no BSD name")]
    Anonymous,

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A disk as delivered by an event, with its whole disk when it is a slice.
struct Lineage {
    disk: Disk,
    parent: Option<Disk>,
}

fn translate(raw: &dyn RawDisk) -> Result<Disk, EventError> {
    let description = raw.description()?;
    let id = raw
        .id()
        .or_else(|| description.media_bsd_name.clone())
        .ok_or(EventError::Anonymous)?;
    Ok(Disk::new(id, description))
}

fn resolve(raw: &dyn RawDisk) -> Result<Lineage, EventError> {
    let mut disk = translate(raw)?;

    let parent = match raw.whole_disk() {
        Some(whole) => {
            let whole = translate(whole.as_ref())?;
            (whole.id != disk.id).then_some(whole)
        }
        None => None,
    };

    disk.parent = parent.as_ref().map(|p| p.id.clone());
    Ok(Lineage { disk, parent })
}

pub struct EventAdapter {
    state: SharedState,
}

impl EventAdapter {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    fn appeared(&self, raw: &dyn RawDisk) -> Result<(), EventError> {
        let Lineage { disk, parent } = resolve(raw)?;
        info!("Disk appeared: {}", disk.id);

        let mut state = self.state.lock();
        let registry = &mut state.registry;

        if let Some(parent) = parent
            && !registry.exists(&parent.id)
        {
            debug!("Registering parent {} ahead of {}", parent.id, disk.id);
            registry.upsert(parent);
        }

        let (id, parent_id) = (disk.id.clone(), disk.parent.clone());
        if !registry.exists(&id) {
            registry.upsert(disk);
            if let Some(parent_id) = parent_id {
                registry.link_child(&id, &parent_id)?;
            }
        }
        Ok(())
    }

    fn disappeared(&self, raw: &dyn RawDisk) -> Result<(), EventError> {
        let disk = translate(raw)?;
        info!("Disk disappeared: {}", disk.id);

        let mut state = self.state.lock();
        let registry = &mut state.registry;

        let parent = registry
            .parent_of(&disk.id)
            .ok()
            .flatten()
            .map(str::to_string);
        if let Some(parent) = parent
            && registry.exists(&parent)
        {
            registry.unlink_child(&disk.id, &parent)?;
        }

        let removed = registry.remove_tree(&disk.id);
        debug!("Removed {removed:?} after {} disappeared", disk.id);
        Ok(())
    }

    fn description_changed(&self, raw: &dyn RawDisk) -> Result<(), EventError> {
        let disk = translate(raw)?;
        debug!("Description changed: {}", disk.id);

        self.state
            .lock()
            .registry
            .update_description(&disk.id, disk.description)?;
        Ok(())
    }
}

impl DiskEventSink for EventAdapter {
    fn disk_appeared(&self, disk: &dyn RawDisk) {
        if let Err(err) = self.appeared(disk) {
            error!("Failed to register appeared disk: {err}");
        }
    }

    fn disk_disappeared(&self, disk: &dyn RawDisk) {
        if let Err(err) = self.disappeared(disk) {
            error!("Failed to remove disappeared disk: {err}");
        }
    }

    fn disk_description_changed(&self, disk: &dyn RawDisk) {
        if let Err(err) = self.description_changed(disk) {
            error!("Failed to update disk description: {err}");
        }
    }
}
