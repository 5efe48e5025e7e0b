// SPDX-License-Identifier: GPL-3.0-only

//! In-memory model of known disks and their hierarchy
//!
//! The registry is plain data; callers serialize access through
//! [`crate::state::SharedState`].

use std::collections::BTreeMap;

use arbiter_types::{Disk, DiskDescription};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Disk {0} is not registered")]
    DiskNotFound(String),

    #[error("Parent disk {parent} of {child} is not registered")]
    ParentNotFound { parent: String, child: String },
}

#[derive(Debug, Default)]
pub struct DiskRegistry {
    disks: BTreeMap<String, Disk>,
}

impl DiskRegistry {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.disks.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    /// Insert a disk if its identifier is not registered yet.
    ///
    /// Returns `false`, leaving the existing record untouched, otherwise.
    pub fn upsert(&mut self, disk: Disk) -> bool {
        if self.disks.contains_key(&disk.id) {
            warn!("Disk {} is already registered, ignoring", disk.id);
            return false;
        }

        debug!("Registering disk {}", disk.id);
        self.disks.insert(disk.id.clone(), disk);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Disk> {
        let removed = self.disks.remove(id);
        match &removed {
            Some(_) => debug!("Removed disk {id}"),
            None => warn!("Disk {id} is not registered, nothing to remove"),
        }
        removed
    }

    pub fn exists(&self, id: &str) -> bool {
        self.disks.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Disk> {
        self.disks.get(id)
    }

    /// Append `child` to the children of `parent` and record the back link.
    ///
    /// Linking an already linked child is a no-op.
    pub fn link_child(&mut self, child: &str, parent: &str) -> Result<(), RegistryError> {
        let parent_disk = self
            .disks
            .get_mut(parent)
            .ok_or_else(|| RegistryError::ParentNotFound {
                parent: parent.to_string(),
                child: child.to_string(),
            })?;

        if !parent_disk.children.iter().any(|c| c == child) {
            parent_disk.children.push(child.to_string());
        }

        if let Some(child_disk) = self.disks.get_mut(child) {
            child_disk.parent = Some(parent.to_string());
        }
        Ok(())
    }

    /// Remove the first occurrence of `child` from the children of `parent`.
    pub fn unlink_child(&mut self, child: &str, parent: &str) -> Result<(), RegistryError> {
        let parent_disk = self
            .disks
            .get_mut(parent)
            .ok_or_else(|| RegistryError::ParentNotFound {
                parent: parent.to_string(),
                child: child.to_string(),
            })?;

        if let Some(position) = parent_disk.children.iter().position(|c| c == child) {
            parent_disk.children.remove(position);
        }

        if let Some(child_disk) = self.disks.get_mut(child)
            && child_disk.parent.as_deref() == Some(parent)
        {
            child_disk.parent = None;
        }
        Ok(())
    }

    pub fn parent_of(&self, id: &str) -> Result<Option<&str>, RegistryError> {
        self.disks
            .get(id)
            .map(|disk| disk.parent.as_deref())
            .ok_or_else(|| RegistryError::DiskNotFound(id.to_string()))
    }

    /// Replace a disk's description, keeping its hierarchy links.
    pub fn update_description(
        &mut self,
        id: &str,
        description: DiskDescription,
    ) -> Result<(), RegistryError> {
        let disk = self
            .disks
            .get_mut(id)
            .ok_or_else(|| RegistryError::DiskNotFound(id.to_string()))?;

        disk.description = description;
        Ok(())
    }

    /// Remove a disk after all of its registered descendants.
    ///
    /// Returns the identifiers actually removed, leaves first.
    pub fn remove_tree(&mut self, id: &str) -> Vec<String> {
        let children = self
            .disks
            .get(id)
            .map(|disk| disk.children.clone())
            .unwrap_or_default();

        let mut removed = Vec::new();
        for child in &children {
            if self.disks.contains_key(child) {
                removed.extend(self.remove_tree(child));
            }
        }

        if self.remove(id).is_some() {
            removed.push(id.to_string());
        }
        removed
    }

    /// All registered disks in identifier order.
    pub fn snapshot(&self) -> Vec<Disk> {
        self.disks.values().cloned().collect()
    }
}
