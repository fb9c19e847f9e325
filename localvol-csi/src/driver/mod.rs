//! gRPC server for the Identity and Controller services.
//!
//! `Driver` binds the configured endpoint and serves until shutdown;
//! `DriverState` (in the `state` submodule) holds the config and registry
//! shared by every service.

mod state;

pub use state::DriverState;

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tokio::signal;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::config::Config;
use crate::controller::ControllerService;
use crate::csi::{
    FILE_DESCRIPTOR_SET, controller_server::ControllerServer, identity_server::IdentityServer,
};
use crate::error::Result;
use crate::identity::IdentityService;
use crate::registry::VolumeRegistry;
use crate::types::Endpoint;

/// Run a best-effort cleanup step, logging a failure instead of returning it
/// so the caller's own result is preserved.
fn log_cleanup_error<F, E>(operation: &str, f: F)
where
    F: FnOnce() -> std::result::Result<(), E>,
    E: std::fmt::Display,
{
    if let Err(e) = f() {
        warn!(operation, error = %e, "cleanup failed");
    }
}

/// CSI plugin server.
pub struct Driver {
    state: Arc<DriverState>,
}

impl Driver {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(DriverState::new(config)),
        })
    }

    /// Build a driver serving an existing registry.
    pub fn with_registry(config: Config, registry: Arc<dyn VolumeRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(DriverState::with_registry(config, registry)),
        })
    }

    pub fn state(&self) -> &Arc<DriverState> {
        &self.state
    }

    /// Run the CSI driver until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<()> {
        let config = &self.state.config;
        info!(
            name = %config.name,
            version = %config.version,
            endpoint = %config.endpoint,
            "starting CSI driver"
        );

        match &config.endpoint {
            Endpoint::Unix(path) => self.run_unix(path).await,
            Endpoint::Tcp(addr) => self.run_tcp(*addr).await,
        }
    }

    async fn run_unix(&self, path: &Path) -> Result<()> {
        // A socket left behind by a previous run would make bind fail.
        if path.exists() {
            fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)?;
        let incoming = tokio_stream::wrappers::UnixListenerStream::new(listener);

        let result = self.serve_grpc(incoming).await;
        log_cleanup_error("remove unix socket", || fs::remove_file(path));
        result
    }

    async fn run_tcp(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "listening");
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

        self.serve_grpc(incoming).await
    }

    async fn serve_grpc<S, IO, E>(&self, incoming: S) -> Result<()>
    where
        S: tokio_stream::Stream<Item = std::result::Result<IO, E>> + Send + 'static,
        IO: tokio::io::AsyncRead
            + tokio::io::AsyncWrite
            + tonic::transport::server::Connected
            + Send
            + Unpin
            + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;

        Server::builder()
            .add_service(reflection)
            .add_service(IdentityServer::new(IdentityService::new(
                self.state.clone(),
            )))
            .add_service(ControllerServer::new(ControllerService::new(
                self.state.clone(),
            )))
            .serve_with_incoming_shutdown(incoming, shutdown_signal())
            .await?;

        info!(volumes = self.state.registry().len(), "CSI driver stopped");
        Ok(())
    }
}

/// Resolve when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
