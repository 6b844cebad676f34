//! watch-tail
//!
//! Tails a single Kubernetes watch:
//! - Prints every object event to stdout
//! - Logs every session lifecycle event
//! - Checkpoints the resource version so a restart resumes where it stopped
//!
//! What to watch comes from environment variables, see `TailOptions`. The
//! cluster connection is inferred by `kube` (`KUBECONFIG`, `~/.kube/config` or
//! the in-cluster service account).

mod checkpoint;
mod controller;
mod error;

#[cfg(test)]
mod checkpoint_test;

use crate::controller::{Controller, TailOptions};
use crate::error::ControllerError;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watch_client::{KubeTransport, WatchTransport};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting watch-tail");

    // Load configuration from environment variables
    let options = TailOptions::from_env()?;

    // Initialize Kubernetes client
    let transport = KubeTransport::try_default().await?;

    info!("Configuration:");
    info!("  API server: {}", transport.server_url());
    info!("  Resource: {}", options.model);
    info!("  Namespace: {}", options.filters.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Name: {}", options.filters.name.as_deref().unwrap_or("any"));
    info!(
        "  Resource version: {}",
        options.watch.resource_version.as_deref().unwrap_or("checkpoint or latest")
    );
    info!(
        "  Retries: {} every {}s, resync after {}s",
        options.watch.retry_max.map_or("unlimited".to_string(), |max| max.to_string()),
        options.watch.retry_delay_sec,
        options.watch.resync_interval_sec
    );
    if let Some(dir) = &options.state_dir {
        info!("  State directory: {}", dir.display());
    }

    // Initialize and run controller
    let controller = Controller::new(options, transport).await?;
    controller.run().await?;

    Ok(())
}
