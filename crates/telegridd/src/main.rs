//! telegridd — the telegrid metadata-plane daemon.
//!
//! Opens the agent store, wires the in-process bus and the manager,
//! spawns the background sweepers and serves the read-only HTTP API.
//!
//! # Usage
//!
//! ```text
//! telegridd --port 8571 --data-dir /var/lib/telegrid
//! telegridd --config /etc/telegrid/telegridd.toml
//! ```

mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use telegrid_bus::InProcessBus;
use telegrid_manager::{Manager, ManagerConfig, Sweeper};
use telegrid_state::AgentStore;

#[derive(Parser)]
#[command(name = "telegridd", about = "telegrid metadata-plane daemon")]
struct Cli {
    /// Port for the HTTP API.
    #[arg(long, default_value = "8571")]
    port: u16,

    /// Data directory for the persistent store.
    #[arg(long, default_value = "/var/lib/telegrid")]
    data_dir: PathBuf,

    /// Optional toml config overriding manager timeouts.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// On-disk daemon configuration. All fields optional; unset fields keep
/// the built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    agent_expiry_threshold_secs: Option<u64>,
    agent_dead_threshold_secs: Option<u64>,
    feed_retention_secs: Option<u64>,
    cursor_idle_retention_secs: Option<u64>,
    process_ttl_secs: Option<u64>,
}

impl FileConfig {
    fn apply(self, mut config: ManagerConfig) -> ManagerConfig {
        if let Some(secs) = self.agent_expiry_threshold_secs {
            config.agent_expiry_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = self.agent_dead_threshold_secs {
            config.agent_dead_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = self.feed_retention_secs {
            config.feed_retention = Duration::from_secs(secs);
        }
        if let Some(secs) = self.cursor_idle_retention_secs {
            config.cursor_idle_retention = Duration::from_secs(secs);
        }
        if let Some(secs) = self.process_ttl_secs {
            config.process_ttl = Duration::from_secs(secs);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telegridd=debug,telegrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ManagerConfig::default();
    if let Some(path) = &cli.config {
        let content = std::fs::read_to_string(path)?;
        let file_config: FileConfig = toml::from_str(&content)?;
        config = file_config.apply(config);
        info!(?path, "config loaded");
    }

    std::fs::create_dir_all(&cli.data_dir)?;
    let db_path = cli.data_dir.join("telegrid.redb");

    let store = AgentStore::open(&db_path)?;
    info!(path = ?db_path, "agent store opened");

    let bus = Arc::new(InProcessBus::new());
    let manager = Arc::new(Manager::new(store, bus, config));
    info!("agent manager initialized");

    // ── Background sweeps ──────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(manager.clone());
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
    });

    // ── HTTP API ───────────────────────────────────────────────────

    let router = api::build_router(manager);
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
    server.await?;

    let _ = sweeper_handle.await;
    info!("telegridd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_overrides_defaults() {
        let parsed: FileConfig = toml::from_str(
            r#"
agent_expiry_threshold_secs = 30
feed_retention_secs = 7200
"#,
        )
        .unwrap();
        let config = parsed.apply(ManagerConfig::default());
        assert_eq!(config.agent_expiry_threshold, Duration::from_secs(30));
        assert_eq!(config.feed_retention, Duration::from_secs(7200));
        // Untouched fields keep their defaults.
        assert_eq!(config.cursor_idle_retention, Duration::from_secs(3600));
    }

    #[test]
    fn empty_file_config_keeps_defaults() {
        let parsed: FileConfig = toml::from_str("").unwrap();
        let config = parsed.apply(ManagerConfig::default());
        assert_eq!(config.agent_expiry_threshold, Duration::from_secs(60));
    }
}
