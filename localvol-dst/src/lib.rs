//! Deterministic Simulation Testing (DST) for the localvol CSI controller.
//!
//! Kept out of `localvol-csi` so the oracle and action generators never end up
//! in the plugin binary.
//!
//! ## Crate Structure
//!
//! - `harness` - Controller harness, oracle and action generator
//! - `simulation` - Runtime construction and simulation runners
//!
//! ## Running DST Tests
//!
//! ```bash
//! # PR-level quick tests
//! cargo test -p localvol-dst simulation
//!
//! # Nightly long-running tests
//! cargo test -p localvol-dst simulation -- --ignored
//!
//! # Reproduce a failure
//! DST_SEED=1234 cargo test -p localvol-dst simulation
//! ```

pub mod harness;
pub mod simulation;

pub use harness::{
    ControllerAction, ControllerHarness, ControllerOracle, ControllerStats, SimulationError,
};
pub use simulation::{build_runtime, get_seed, run_controller_simulation};
