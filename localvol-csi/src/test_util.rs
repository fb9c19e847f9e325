//! Shared test utilities for CSI service tests.

use std::sync::Arc;

use crate::config::Config;
use crate::controller::ControllerService;
use crate::driver::DriverState;
use crate::identity::IdentityService;

/// Test fixture providing an isolated registry for each test.
pub struct TestFixture {
    pub state: Arc<DriverState>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            state: Arc::new(DriverState::new(config)),
        }
    }

    pub fn identity_service(&self) -> IdentityService {
        IdentityService::new(Arc::clone(&self.state))
    }

    pub fn controller_service(&self) -> ControllerService {
        ControllerService::new(Arc::clone(&self.state))
    }
}
