//! Error types for the CSI plugin.

use std::io;
use thiserror::Error;
use tonic::Status;

pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for validating required fields.
///
/// Returns `INVALID_ARGUMENT` status if the field is missing or empty.
pub trait Require<T> {
    fn require(self, name: &str) -> std::result::Result<T, Status>;
}

impl Require<String> for String {
    fn require(self, name: &str) -> std::result::Result<String, Status> {
        if self.is_empty() {
            Err(Status::invalid_argument(format!("{name} is required")))
        } else {
            Ok(self)
        }
    }
}

impl<T> Require<T> for Option<T> {
    fn require(self, name: &str) -> std::result::Result<T, Status> {
        self.ok_or_else(|| Status::invalid_argument(format!("{name} is required")))
    }
}

/// Plugin errors with structured context.
#[derive(Debug, Error)]
pub enum Error {
    #[error("volume id must not be empty")]
    EmptyVolumeId,

    #[error("max_entries must not be negative, got {0}")]
    NegativeMaxEntries(i32),

    #[error("invalid starting token: {token}")]
    InvalidStartingToken { token: String },

    #[error("invalid endpoint (expected unix://<path> or tcp://<host:port>): {endpoint}")]
    InvalidEndpoint { endpoint: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("gRPC reflection error: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match &err {
            // INVALID_ARGUMENT: Client provided invalid input
            Error::EmptyVolumeId | Error::NegativeMaxEntries(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }

            // ABORTED: Pagination token no longer matches the volume list
            Error::InvalidStartingToken { .. } => tonic::Status::aborted(err.to_string()),

            // INTERNAL: Startup and infrastructure errors
            Error::InvalidEndpoint { .. }
            | Error::Config(_)
            | Error::Reflection(_)
            | Error::Transport(_)
            | Error::Io(_) => tonic::Status::internal(err.to_string()),
        }
    }
}
