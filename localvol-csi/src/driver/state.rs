//! Driver state management.
//!
//! DriverState pairs the plugin configuration with the volume registry and
//! owns the volume lifecycle rules the controller service exposes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::registry::{Admission, InMemoryRegistry, VolumeRegistry};
use crate::types::{VolumeDescriptor, VolumeId};

/// Shared driver state.
pub struct DriverState {
    pub config: Config,
    registry: Arc<dyn VolumeRegistry>,
}

impl DriverState {
    /// Create state backed by a fresh in-memory registry.
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, Arc::new(InMemoryRegistry::new()))
    }

    pub fn with_registry(config: Config, registry: Arc<dyn VolumeRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn registry(&self) -> &dyn VolumeRegistry {
        self.registry.as_ref()
    }

    /// Create a volume, or return the existing one with the same id.
    ///
    /// An existing volume is returned as stored; `capacity_bytes` and
    /// `parameters` only apply to the first creation.
    pub fn create_volume(
        &self,
        id: VolumeId,
        capacity_bytes: i64,
        parameters: HashMap<String, String>,
    ) -> VolumeDescriptor {
        debug_assert!(capacity_bytes >= 0, "capacity_bytes must not be negative");

        let admission = self
            .registry
            .create_if_absent(VolumeDescriptor::new(id, capacity_bytes, parameters));

        match &admission {
            Admission::Created(d) => info!(
                volume_id = %d.id,
                capacity_bytes = d.capacity_bytes,
                access_mode = %d.access_mode,
                "volume created"
            ),
            Admission::Existing(d) => debug!(volume_id = %d.id, "volume already exists"),
        }
        admission.into_descriptor()
    }

    /// Delete a volume by id. Deleting an unknown volume succeeds.
    pub fn delete_volume(&self, id: &VolumeId) {
        match self.registry.remove(id) {
            Some(_) => info!(volume_id = %id, "volume deleted"),
            None => debug!(volume_id = %id, "volume not found, nothing to delete"),
        }
    }

    /// List all volumes, sorted by id.
    pub fn list_volumes(&self) -> Vec<VolumeDescriptor> {
        let mut volumes = self.registry.list();
        // Pagination tokens are offsets, so the order must not depend on the
        // registry implementation.
        volumes.sort_by(|a, b| a.id.cmp(&b.id));
        volumes
    }

    pub fn get_volume(&self, id: &VolumeId) -> Option<VolumeDescriptor> {
        self.registry.get(id)
    }
}
