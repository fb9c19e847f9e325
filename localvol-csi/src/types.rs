//! Type-safe wrappers for the plugin's domain types.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A volume identifier.
///
/// Volumes are keyed by the name the orchestrator supplied to CreateVolume,
/// so the id doubles as the name. It is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(String);

impl VolumeId {
    /// Parse a volume id, rejecting the empty string.
    pub fn parse(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::EmptyVolumeId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a volume may be accessed by nodes.
///
/// Mirrors the CSI access modes. Volumes are created with `Unknown` and the
/// mode is never changed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    #[default]
    Unknown,
    SingleNodeWriter,
    SingleNodeReaderOnly,
    MultiNodeReaderOnly,
    MultiNodeSingleWriter,
    MultiNodeMultiWriter,
    SingleNodeSingleWriter,
    SingleNodeMultiWriter,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::SingleNodeWriter => "SINGLE_NODE_WRITER",
            Self::SingleNodeReaderOnly => "SINGLE_NODE_READER_ONLY",
            Self::MultiNodeReaderOnly => "MULTI_NODE_READER_ONLY",
            Self::MultiNodeSingleWriter => "MULTI_NODE_SINGLE_WRITER",
            Self::MultiNodeMultiWriter => "MULTI_NODE_MULTI_WRITER",
            Self::SingleNodeSingleWriter => "SINGLE_NODE_SINGLE_WRITER",
            Self::SingleNodeMultiWriter => "SINGLE_NODE_MULTI_WRITER",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record the registry keeps for each volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub id: VolumeId,
    /// Capacity requested at creation; 0 when the request named none.
    pub capacity_bytes: i64,
    pub access_mode: AccessMode,
    /// Informational key/value pairs, returned to the orchestrator as the
    /// volume context.
    pub attributes: HashMap<String, String>,
}

impl VolumeDescriptor {
    /// Build the descriptor for a newly created volume.
    pub fn new(id: VolumeId, capacity_bytes: i64, attributes: HashMap<String, String>) -> Self {
        Self {
            id,
            capacity_bytes,
            access_mode: AccessMode::Unknown,
            attributes,
        }
    }
}

/// The address the gRPC server listens on.
///
/// Written as `unix:///path/to/socket` or `tcp://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidEndpoint {
            endpoint: endpoint.to_string(),
        };

        if let Some(path) = endpoint.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid());
            }
            Ok(Self::Unix(PathBuf::from(path)))
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let addr = addr.parse().map_err(|_| invalid())?;
            Ok(Self::Tcp(addr))
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}
