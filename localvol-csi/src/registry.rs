//! Volume registry.
//!
//! The registry is the only shared mutable state in the plugin. Every RPC
//! reads or writes through it, and each operation is a single atomic
//! transition: create-if-absent, remove, or a read.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;

use crate::types::{VolumeDescriptor, VolumeId};

/// Result of [`VolumeRegistry::create_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The descriptor was inserted.
    Created(VolumeDescriptor),
    /// A volume with the same id already existed; its descriptor is returned
    /// unchanged and the proposed one is dropped.
    Existing(VolumeDescriptor),
}

impl Admission {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn descriptor(&self) -> &VolumeDescriptor {
        match self {
            Self::Created(d) | Self::Existing(d) => d,
        }
    }

    pub fn into_descriptor(self) -> VolumeDescriptor {
        match self {
            Self::Created(d) | Self::Existing(d) => d,
        }
    }
}

/// Storage for volume descriptors.
///
/// Implementations must make `create_if_absent` atomic: concurrent calls for
/// the same id insert at most once and all observe the same descriptor.
pub trait VolumeRegistry: Send + Sync {
    fn get(&self, id: &VolumeId) -> Option<VolumeDescriptor>;

    /// Insert `descriptor` unless a volume with its id already exists.
    fn create_if_absent(&self, descriptor: VolumeDescriptor) -> Admission;

    /// Remove a volume, returning its descriptor. Absent ids are a no-op.
    fn remove(&self, id: &VolumeId) -> Option<VolumeDescriptor>;

    /// Snapshot of all descriptors. Callers must not rely on the order.
    fn list(&self) -> Vec<VolumeDescriptor>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local registry guarded by a read/write lock.
///
/// `list` returns descriptors sorted by id so that offset-based pagination is
/// stable between calls when the set of volumes does not change.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    volumes: RwLock<HashMap<VolumeId, VolumeDescriptor>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

// No operation below can leave the map half-updated, so a poisoned lock is
// still consistent and safe to keep using.
impl VolumeRegistry for InMemoryRegistry {
    fn get(&self, id: &VolumeId) -> Option<VolumeDescriptor> {
        let volumes = self.volumes.read().unwrap_or_else(|e| e.into_inner());
        volumes.get(id).cloned()
    }

    fn create_if_absent(&self, descriptor: VolumeDescriptor) -> Admission {
        let mut volumes = self.volumes.write().unwrap_or_else(|e| e.into_inner());
        match volumes.entry(descriptor.id.clone()) {
            Entry::Occupied(e) => Admission::Existing(e.get().clone()),
            Entry::Vacant(e) => Admission::Created(e.insert(descriptor).clone()),
        }
    }

    fn remove(&self, id: &VolumeId) -> Option<VolumeDescriptor> {
        let mut volumes = self.volumes.write().unwrap_or_else(|e| e.into_inner());
        volumes.remove(id)
    }

    fn list(&self) -> Vec<VolumeDescriptor> {
        let volumes = self.volumes.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = volumes.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    fn len(&self) -> usize {
        self.volumes.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
