//! localvol-csi: CSI controller plugin with an in-memory volume registry.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use localvol_csi::{Config, Driver, Endpoint};

#[derive(Parser, Debug)]
#[command(name = "localvol-csi")]
#[command(about = "CSI controller plugin backed by an in-memory volume registry")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// CSI endpoint (unix:// or tcp://), overriding the config file.
    #[arg(long)]
    endpoint: Option<String>,

    /// Verbosity level (0-4).
    #[arg(short, default_value = "0")]
    v: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep h2, tonic and hyper at warn unless asked for everything.
    let filter = match args.v {
        0 => "warn",
        1 => "localvol_csi=info,warn",
        2 => "localvol_csi=debug,warn",
        3 => "localvol_csi=trace,warn",
        _ => "localvol_csi=trace,info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(endpoint) = args.endpoint {
        config.endpoint = Endpoint::parse(&endpoint).context("invalid --endpoint")?;
    }

    let driver = Driver::new(config).context("invalid configuration")?;
    driver.run().await?;

    Ok(())
}
