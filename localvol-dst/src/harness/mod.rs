//! Simulation harnesses for the CSI controller.

pub mod controller;

pub use controller::{ControllerAction, ControllerHarness, ControllerOracle, ControllerStats};

/// Error type for simulation failures.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("oracle mismatch: {context}")]
    Mismatch { context: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<tonic::Status> for SimulationError {
    fn from(status: tonic::Status) -> Self {
        Self::Unexpected(format!("{:?}: {}", status.code(), status.message()))
    }
}
