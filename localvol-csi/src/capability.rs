//! Volume capability validation.
//!
//! Volumes here have no backing filesystem, so a capability is acceptable
//! only when it asks for nothing the plugin would have to honour at mount
//! time: no filesystem type and no mount flags.

use thiserror::Error;

use crate::csi;
use crate::csi::volume_capability::AccessType;

/// Why a requested capability cannot be satisfied.
///
/// The messages are part of the ValidateVolumeCapabilities response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unsupported {
    #[error("Specifying FsType is unsupported.")]
    FsType,

    #[error("Specifying mount flags is unsupported.")]
    MountFlags,
}

/// Check a capability list.
///
/// A filesystem type anywhere in the list is reported ahead of mount flags,
/// so the outcome does not depend on the order of the entries.
pub fn validate(capabilities: &[csi::VolumeCapability]) -> Result<(), Unsupported> {
    let mounts: Vec<_> = capabilities
        .iter()
        .filter_map(|capability| match &capability.access_type {
            Some(AccessType::Mount(mount)) => Some(mount),
            _ => None,
        })
        .collect();

    if mounts.iter().any(|mount| !mount.fs_type.is_empty()) {
        return Err(Unsupported::FsType);
    }
    if mounts
        .iter()
        .flat_map(|mount| &mount.mount_flags)
        .any(|flag| !flag.is_empty())
    {
        return Err(Unsupported::MountFlags);
    }
    Ok(())
}
