//! Process entry point.
//!
//! Wires the pieces together: logging, the Kubernetes platform client, the
//! bootstrap configuration from the ConfigMap named by `INIT_CONFIG_MAP`, and
//! the [`Keeper`] engine, raced against SIGINT/SIGTERM so the orchestration
//! platform can stop the pod gracefully. Fatal errors exit non-zero; the
//! platform restarts the pod, and bootstrap then re-detects the initialized
//! cluster and rehydrates its credentials from the Secret.

use std::sync::Arc;

use tracing::{error, info};

use sealkeeper::config::BootstrapConfig;
use sealkeeper::constants::INIT_CONFIG_MAP_ENV;
use sealkeeper::error::{Error, Result};
use sealkeeper::keeper::Keeper;
use sealkeeper::platform::{KubePlatform, Platform};
use sealkeeper::telemetry::{init_logging, LogFormat};

#[tokio::main]
async fn main() {
    if let Err(err) = init_logging(LogFormat::from_env()) {
        eprintln!("could not initialize logging: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run().await {
        error!(error = %err, kind = ?err.kind(), "fatal error, exiting");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_map_name = std::env::var(INIT_CONFIG_MAP_ENV).map_err(|_| {
        Error::Config(format!(
            "the initialization ConfigMap is not specified, set {INIT_CONFIG_MAP_ENV}"
        ))
    })?;
    info!(config_map = %config_map_name, "loading bootstrap configuration");

    let platform = Arc::new(KubePlatform::connect().await?);
    let data = platform.read_config(&config_map_name).await?;
    let config = BootstrapConfig::from_map(&data)?;

    let mut keeper = Keeper::new(config, platform);
    tokio::select! {
        result = keeper.run() => result,
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping");
            Ok(())
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
