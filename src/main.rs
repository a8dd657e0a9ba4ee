//! CDN health monitor.
//!
//! Polls cache servers and peer monitors for health, driven by the
//! monitoring configuration published by the control service.
//!
//! # Architecture Overview
//!
//! ```text
//!   Control service
//!         │  monitoring config + snapshot
//!         ▼
//!   ┌──────────────────┐   single slot   ┌──────────────────┐
//!   │ monitor-config   │────────────────▶│  config manager  │
//!   │ poller (session, │                 │ (targets, polling│
//!   │ freshness cache) │◀── interval ────│  intervals)      │
//!   └──────────────────┘                 └────────┬─────────┘
//!            ▲ supervised                         │ EngineConfig
//!                                     ┌───────────┴───────────┐
//!                                     ▼                       ▼
//!                             ┌───────────────┐       ┌───────────────┐
//!                             │ caches engine │       │ peers engine  │
//!                             └───────┬───────┘       └───────┬───────┘
//!                                     ▼                       ▼
//!                              health handler          health handler
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cdn_monitor::config::load_config;
use cdn_monitor::lifecycle::{spawn_signal_handler, startup, Shutdown};
use cdn_monitor::observability::{init_logging, init_metrics};

#[derive(Parser)]
#[command(name = "cdn-monitor")]
#[command(about = "Health monitor for CDN cache servers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "cdn-monitor.toml")]
    config: PathBuf,

    /// Log level for this crate; `RUST_LOG` takes precedence.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load_config(&cli.config);
    let level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.observability.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = ?cli.config, error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        tenant = %config.monitor.tenant,
        control_url = %config.control.url,
        "cdn-monitor starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_socket_addr() {
            Some(addr) => init_metrics(addr),
            None => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    match startup::run(config, Some(cli.config), shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Monitor stopped");
            ExitCode::FAILURE
        }
    }
}
