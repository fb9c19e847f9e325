//! localvol-csi: CSI controller plugin backed by an in-memory volume registry.
//!
//! This crate implements the controller half of the Container Storage
//! Interface (CSI) specification. Volumes are pure metadata: creating one
//! records a descriptor in a [`VolumeRegistry`], and nothing is ever attached
//! or mounted.

// Generated protobuf code has doc formatting issues
#![allow(clippy::doc_overindented_list_items)]
#![allow(clippy::doc_lazy_continuation)]
// tonic::Status is large by design (176 bytes)
#![allow(clippy::result_large_err)]

pub mod capability;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod identity;
pub mod registry;
pub mod types;

pub mod csi {
    tonic::include_proto!("csi.v1");

    pub use prost_types::Timestamp;

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("csi_descriptor");
}

pub use config::Config;
pub use driver::{Driver, DriverState};
pub use error::{ConfigError, Error, Result};
pub use registry::{Admission, InMemoryRegistry, VolumeRegistry};
pub use types::{AccessMode, Endpoint, VolumeDescriptor, VolumeId};

#[cfg(test)]
pub(crate) mod test_util;
