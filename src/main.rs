//! Resilient outbound call client.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ Pipeline ──▶ CircuitBreaker ──▶ retry loop ──▶ classifier ──▶ HttpTransport ──▶ downstream
//!                 ▲               │  (gate)                         │
//!                 │               ◀──────── outcome recorded ───────┘
//!                 └── BrokenCircuit / ExhaustedRetries / Permanent / response
//! ```
//!
//! The binary loads a TOML config, builds one pipeline per downstream and
//! fires calls at one of them, printing breaker state at the end.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use tokio::sync::broadcast::error::TryRecvError;

use resilient_call::config::load_config;
use resilient_call::lifecycle::signals::spawn_ctrl_c_handler;
use resilient_call::observability::{logging, metrics};
use resilient_call::{DownstreamRegistry, RequestDescriptor, Shutdown};

#[derive(Parser)]
#[command(name = "resilient-call")]
#[command(about = "Call downstream services through circuit breaker and retry policies", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "resilient-call.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print it
    Check,
    /// Call a downstream through its pipeline
    Call {
        /// Downstream name from the configuration.
        downstream: String,

        /// Path relative to the downstream base URL.
        path: String,

        /// Number of rounds to run.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Pause between rounds in milliseconds.
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// Concurrent calls per round.
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability.log_level, config.observability.log_format);

    tracing::info!(
        config = %cli.config.display(),
        downstreams = config.downstreams.len(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Call {
            downstream,
            path,
            count,
            interval_ms,
            concurrency,
        } => {
            if config.observability.metrics_enabled {
                match config.observability.metrics_address.parse() {
                    Ok(addr) => metrics::init_metrics(addr),
                    Err(_) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let registry = DownstreamRegistry::from_config(&config)?;
            let pipeline = registry
                .get(&downstream)
                .ok_or_else(|| format!("unknown downstream '{}'", downstream))?;

            let shutdown = Shutdown::new();
            spawn_ctrl_c_handler(shutdown.clone());
            let mut stop = shutdown.subscribe();

            for round in 1..=count {
                let calls = (0..concurrency.max(1)).map(|_| {
                    let pipeline = pipeline.clone();
                    let request = RequestDescriptor::get(path.clone());
                    let cancelled = shutdown.cancelled();
                    async move { (request.request_id.clone(), pipeline.execute_with_cancel(&request, cancelled).await) }
                });

                for (request_id, result) in join_all(calls).await {
                    match result {
                        Ok(response) => tracing::info!(
                            round,
                            request_id = %request_id,
                            status = %response.status,
                            bytes = response.body.len(),
                            "Call succeeded"
                        ),
                        Err(e) => tracing::warn!(
                            round,
                            request_id = %request_id,
                            unavailable = e.is_unavailable(),
                            error = %e,
                            "Call failed"
                        ),
                    }
                }

                if round < count && interval_ms > 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
                        _ = stop.recv() => break,
                    }
                }
                if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                    break;
                }
            }

            println!("{}", serde_json::to_string_pretty(&registry.snapshot())?);
        }
    }

    Ok(())
}
