//! Controller-level simulation harness.
//!
//! Drives random CreateVolume / DeleteVolume / ListVolumes /
//! ValidateVolumeCapabilities sequences through the controller service and
//! compares every response against a sorted in-memory oracle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use localvol_csi::controller::ControllerService;
use localvol_csi::csi;
use localvol_csi::csi::controller_server::Controller;
use localvol_csi::csi::volume_capability::{AccessType, MountVolume};
use localvol_csi::{Config, DriverState, VolumeId, VolumeRegistry};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tonic::{Code, Request};

use super::SimulationError;

const FS_TYPE_MESSAGE: &str = "Specifying FsType is unsupported.";
const MOUNT_FLAGS_MESSAGE: &str = "Specifying mount flags is unsupported.";

/// A mount capability as (fs_type, mount_flags).
pub type Mount = (String, Vec<String>);

/// Actions that can be performed in simulation.
#[derive(Debug, Clone)]
pub enum ControllerAction {
    Create { name: String, capacity_bytes: i64 },
    CreateUnnamed,
    Delete { name: String },
    List { max_entries: i32 },
    Validate { mounts: Vec<Mount> },
}

/// In-memory oracle for verifying correctness.
///
/// Maps volume name to the capacity recorded by the first create.
#[derive(Debug, Default)]
pub struct ControllerOracle {
    volumes: BTreeMap<String, i64>,
}

impl ControllerOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the capacity the volume should report, and whether it is new.
    pub fn create(&mut self, name: &str, capacity_bytes: i64) -> (i64, bool) {
        match self.volumes.get(name) {
            Some(&existing) => (existing, false),
            None => {
                self.volumes.insert(name.to_string(), capacity_bytes);
                (capacity_bytes, true)
            }
        }
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.volumes.remove(name).is_some()
    }

    pub fn capacity(&self, name: &str) -> Option<i64> {
        self.volumes.get(name).copied()
    }

    /// Volume names in listing order.
    pub fn names(&self) -> Vec<String> {
        self.volumes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// The message ValidateVolumeCapabilities should return, or `None` when
    /// the mounts are supported.
    pub fn validation_message(mounts: &[Mount]) -> Option<&'static str> {
        if mounts.iter().any(|(fs_type, _)| !fs_type.is_empty()) {
            Some(FS_TYPE_MESSAGE)
        } else if mounts
            .iter()
            .flat_map(|(_, flags)| flags)
            .any(|flag| !flag.is_empty())
        {
            Some(MOUNT_FLAGS_MESSAGE)
        } else {
            None
        }
    }
}

/// Simulation statistics.
#[derive(Debug, Default, Clone)]
pub struct ControllerStats {
    pub operations: u64,
    pub creates: u64,
    pub volumes_created: u64,
    pub deletes: u64,
    pub volumes_deleted: u64,
    pub lists: u64,
    pub pages: u64,
    pub validations: u64,
    pub rejected: u64,
}

/// Controller simulation harness.
pub struct ControllerHarness {
    rng: SmallRng,
    state: Arc<DriverState>,
    service: ControllerService,
    oracle: ControllerOracle,
    name_pool: u32,
    stats: ControllerStats,
}

impl ControllerHarness {
    /// `name_pool` bounds the number of distinct volume names, so a small pool
    /// exercises repeated creates and deletes of the same volume.
    pub fn new(seed: u64, name_pool: u32) -> Self {
        let state = Arc::new(DriverState::new(Config::default()));
        Self {
            rng: SmallRng::seed_from_u64(seed),
            service: ControllerService::new(Arc::clone(&state)),
            state,
            oracle: ControllerOracle::new(),
            name_pool: name_pool.max(1),
            stats: ControllerStats::default(),
        }
    }

    /// Run the simulation for a given number of operations.
    pub async fn run(&mut self, operations: u64) -> Result<(), SimulationError> {
        for _ in 0..operations {
            let action = self.sample_action();
            self.execute(action).await?;
            self.stats.operations += 1;
            self.validate_invariants()?;
        }
        Ok(())
    }

    fn validate_invariants(&self) -> Result<(), SimulationError> {
        let registry = self.state.registry();
        if registry.len() != self.oracle.len() {
            return Err(SimulationError::Mismatch {
                context: format!(
                    "volume count: expected {}, got {}",
                    self.oracle.len(),
                    registry.len()
                ),
            });
        }

        for name in self.oracle.names() {
            let id = VolumeId::parse(name.as_str())
                .map_err(|e| SimulationError::Unexpected(e.to_string()))?;
            let stored = self.state.get_volume(&id);
            let expected = self.oracle.capacity(&name);
            if stored.as_ref().map(|d| d.capacity_bytes) != expected {
                return Err(SimulationError::Mismatch {
                    context: format!(
                        "volume {name}: expected capacity {expected:?}, got {:?}",
                        stored.map(|d| d.capacity_bytes)
                    ),
                });
            }
        }
        Ok(())
    }

    fn sample_name(&mut self) -> String {
        format!("vol-{}", self.rng.random_range(0..self.name_pool))
    }

    fn sample_mounts(&mut self) -> Vec<Mount> {
        let count = self.rng.random_range(0..=3);
        (0..count)
            .map(|_| {
                let fs_type = if self.rng.random_bool(0.2) {
                    "ext4".to_string()
                } else {
                    String::new()
                };
                let flag_count = self.rng.random_range(0..=2);
                let flags = (0..flag_count)
                    .map(|_| {
                        if self.rng.random_bool(0.3) {
                            "noatime".to_string()
                        } else {
                            String::new()
                        }
                    })
                    .collect();
                (fs_type, flags)
            })
            .collect()
    }

    fn sample_action(&mut self) -> ControllerAction {
        let choice = self.rng.random_range(0..100);
        match choice {
            0..40 => {
                let capacity_bytes = if self.rng.random_bool(0.5) {
                    0
                } else {
                    self.rng.random_range(1..=1i64 << 40)
                };
                ControllerAction::Create {
                    name: self.sample_name(),
                    capacity_bytes,
                }
            }
            40..45 => ControllerAction::CreateUnnamed,
            45..70 => ControllerAction::Delete {
                name: self.sample_name(),
            },
            70..85 => ControllerAction::List {
                max_entries: self.rng.random_range(0..=4),
            },
            _ => ControllerAction::Validate {
                mounts: self.sample_mounts(),
            },
        }
    }

    /// Execute a single action (public for harness testing).
    pub async fn execute(&mut self, action: ControllerAction) -> Result<(), SimulationError> {
        match action {
            ControllerAction::Create {
                name,
                capacity_bytes,
            } => {
                self.stats.creates += 1;
                let (expected_capacity, created) = self.oracle.create(&name, capacity_bytes);
                if created {
                    self.stats.volumes_created += 1;
                }

                let volume = self
                    .service
                    .create_volume(Request::new(create_request(&name, capacity_bytes)))
                    .await?
                    .into_inner()
                    .volume
                    .ok_or_else(|| SimulationError::Mismatch {
                        context: format!("create({name}) returned no volume"),
                    })?;

                if volume.volume_id != name || volume.capacity_bytes != expected_capacity {
                    return Err(SimulationError::Mismatch {
                        context: format!(
                            "create({name}): expected capacity {expected_capacity}, got {} for {}",
                            volume.capacity_bytes, volume.volume_id
                        ),
                    });
                }
            }
            ControllerAction::CreateUnnamed => {
                self.stats.rejected += 1;
                let result = self
                    .service
                    .create_volume(Request::new(create_request("", 0)))
                    .await;
                match result {
                    Err(status) if status.code() == Code::InvalidArgument => {}
                    other => {
                        return Err(SimulationError::Mismatch {
                            context: format!("create(\"\"): expected InvalidArgument, got {other:?}"),
                        });
                    }
                }
            }
            ControllerAction::Delete { name } => {
                self.stats.deletes += 1;
                if self.oracle.delete(&name) {
                    self.stats.volumes_deleted += 1;
                }
                self.service
                    .delete_volume(Request::new(csi::DeleteVolumeRequest {
                        volume_id: name,
                        secrets: HashMap::new(),
                    }))
                    .await?;
            }
            ControllerAction::List { max_entries } => {
                self.stats.lists += 1;
                let listed = self.list_all(max_entries).await?;
                let expected = self.oracle.names();
                if listed != expected {
                    return Err(SimulationError::Mismatch {
                        context: format!(
                            "list(max_entries={max_entries}): expected {expected:?}, got {listed:?}"
                        ),
                    });
                }
            }
            ControllerAction::Validate { mounts } => {
                self.stats.validations += 1;
                let expected = ControllerOracle::validation_message(&mounts);
                let response = self
                    .service
                    .validate_volume_capabilities(Request::new(validate_request(&mounts)))
                    .await?
                    .into_inner();

                let ok = match expected {
                    None => response.confirmed.is_some() && response.message.is_empty(),
                    Some(message) => response.confirmed.is_none() && response.message == message,
                };
                if !ok {
                    return Err(SimulationError::Mismatch {
                        context: format!(
                            "validate({mounts:?}): expected {expected:?}, got confirmed={} message={:?}",
                            response.confirmed.is_some(),
                            response.message
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Follow `next_token` until the listing is exhausted.
    async fn list_all(&mut self, max_entries: i32) -> Result<Vec<String>, SimulationError> {
        let mut names = Vec::new();
        let mut token = String::new();
        // One more page than there are volumes means the token never ran out.
        let page_limit = self.oracle.len() + 1;

        for _ in 0..page_limit {
            self.stats.pages += 1;
            let page = self
                .service
                .list_volumes(Request::new(csi::ListVolumesRequest {
                    max_entries,
                    starting_token: token,
                }))
                .await?
                .into_inner();

            if max_entries > 0 && page.entries.len() > max_entries as usize {
                return Err(SimulationError::Mismatch {
                    context: format!(
                        "list page has {} entries, max_entries={max_entries}",
                        page.entries.len()
                    ),
                });
            }
            names.extend(
                page.entries
                    .into_iter()
                    .filter_map(|entry| entry.volume.map(|v| v.volume_id)),
            );
            if page.next_token.is_empty() {
                return Ok(names);
            }
            token = page.next_token;
        }

        Err(SimulationError::Mismatch {
            context: format!("list(max_entries={max_entries}) did not terminate"),
        })
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }
}

fn create_request(name: &str, capacity_bytes: i64) -> csi::CreateVolumeRequest {
    csi::CreateVolumeRequest {
        name: name.to_string(),
        capacity_range: (capacity_bytes > 0).then_some(csi::CapacityRange {
            required_bytes: capacity_bytes,
            limit_bytes: 0,
        }),
        volume_capabilities: vec![],
        parameters: HashMap::new(),
        secrets: HashMap::new(),
        volume_content_source: None,
        accessibility_requirements: None,
        mutable_parameters: HashMap::new(),
    }
}

fn validate_request(mounts: &[Mount]) -> csi::ValidateVolumeCapabilitiesRequest {
    let volume_capabilities = mounts
        .iter()
        .map(|(fs_type, flags)| csi::VolumeCapability {
            access_type: Some(AccessType::Mount(MountVolume {
                fs_type: fs_type.clone(),
                mount_flags: flags.clone(),
                volume_mount_group: String::new(),
            })),
            access_mode: None,
        })
        .collect();

    csi::ValidateVolumeCapabilitiesRequest {
        volume_id: String::new(),
        volume_context: HashMap::new(),
        volume_capabilities,
        parameters: HashMap::new(),
        secrets: HashMap::new(),
        mutable_parameters: HashMap::new(),
    }
}
