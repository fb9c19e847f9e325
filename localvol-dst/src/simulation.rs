//! Simulation runners and utilities.
//!
//! Every run is driven by a single `u64` seed. Set `DST_SEED` to replay a
//! failing run.

use crate::harness::{ControllerHarness, SimulationError};

/// Build a single-threaded tokio runtime for simulation.
///
/// Controller handlers never yield, so a current-thread runtime executes
/// each action to completion in the order the harness issues them.
pub fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Run a controller simulation with the given seed and number of operations.
pub async fn run_controller_simulation(
    seed: u64,
    name_pool: u32,
    operations: u64,
) -> Result<(), SimulationError> {
    eprintln!("Controller simulation: seed={seed}, names={name_pool}, ops={operations}");

    let mut harness = ControllerHarness::new(seed, name_pool);
    harness.run(operations).await?;

    eprintln!("Controller simulation complete: {:?}", harness.stats());
    Ok(())
}

/// Get the seed from environment or generate a random one.
pub fn get_seed() -> u64 {
    std::env::var("DST_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(rand::random)
}
