//! CSI Identity service implementation.
//!
//! Reports the configured plugin name and version, and advertises the
//! controller service as the only plugin capability.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::trace;

use crate::csi;
use crate::csi::plugin_capability::service::Type as ServiceType;
use crate::driver::DriverState;

pub struct IdentityService {
    state: Arc<DriverState>,
}

impl IdentityService {
    pub fn new(state: Arc<DriverState>) -> Self {
        Self { state }
    }

    fn service_capability(kind: ServiceType) -> csi::PluginCapability {
        csi::PluginCapability {
            r#type: Some(csi::plugin_capability::Type::Service(
                csi::plugin_capability::Service {
                    r#type: kind as i32,
                },
            )),
        }
    }
}

#[tonic::async_trait]
impl csi::identity_server::Identity for IdentityService {
    async fn get_plugin_info(
        &self,
        _request: Request<csi::GetPluginInfoRequest>,
    ) -> Result<Response<csi::GetPluginInfoResponse>, Status> {
        let config = &self.state.config;
        trace!(name = %config.name, version = %config.version, "GetPluginInfo");

        Ok(Response::new(csi::GetPluginInfoResponse {
            name: config.name.clone(),
            vendor_version: config.version.clone(),
            manifest: HashMap::new(),
        }))
    }

    async fn get_plugin_capabilities(
        &self,
        _request: Request<csi::GetPluginCapabilitiesRequest>,
    ) -> Result<Response<csi::GetPluginCapabilitiesResponse>, Status> {
        Ok(Response::new(csi::GetPluginCapabilitiesResponse {
            capabilities: vec![Self::service_capability(ServiceType::ControllerService)],
        }))
    }

    async fn probe(
        &self,
        _request: Request<csi::ProbeRequest>,
    ) -> Result<Response<csi::ProbeResponse>, Status> {
        // The registry lives in memory, so the plugin is ready once it is serving.
        Ok(Response::new(csi::ProbeResponse { ready: Some(true) }))
    }
}
