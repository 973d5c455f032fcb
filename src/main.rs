//! message-gate
//!
//! Runs the security gateway over a stream of newline-delimited JSON records
//! on stdin and prints one JSON decision per record on stdout.
//!
//! # Architecture Overview
//!
//! ```text
//!   stdin (JSONL)          ┌──────────────────────────────────────────┐
//!   ──────────────────────▶│              SecurityGateway             │
//!     message  ───────────▶│ block → rate limit → sanitize → session  │──▶ decision
//!     failure  ───────────▶│ classify → breaker → recovery plan       │──▶ outcome
//!     report   ───────────▶│ audit → threat analysis → report         │──▶ report
//!                          └──────────────────────────────────────────┘
//!                             ▲                ▲
//!                  config watcher      maintenance tasks
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use message_gate::config::watcher::ConfigWatcher;
use message_gate::config::{load_config, GatewayConfig};
use message_gate::lifecycle::{shutdown_signal, spawn_maintenance, Shutdown};
use message_gate::observability::{logging, metrics};
use message_gate::resilience::{ErrorContext, RawError};
use message_gate::security::crypto::{generate_key, PayloadCipher};
use message_gate::{InboundMessage, SecurityGateway, SystemClock};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "message-gate", version, about = "Security and resilience gate for chat messages")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,

    /// Print a fresh payload encryption key and exit.
    #[arg(long)]
    generate_key: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputRecord {
    Message(InboundMessage),
    Failure {
        error: RawError,
        #[serde(default)]
        context: ErrorContext,
    },
    Report,
    Stats,
}

#[derive(Debug, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
enum Output {
    Admitted {
        admission: message_gate::Admission,
    },
    Denied {
        kind: &'static str,
        message: String,
        retry_after_ms: Option<u64>,
    },
    Failure {
        outcome: message_gate::FailureOutcome,
        message: Option<String>,
    },
    Report {
        report: message_gate::audit::SecurityReport,
    },
    Stats {
        stats: message_gate::gateway::GatewayStats,
    },
    Invalid {
        error: String,
    },
}

fn evaluate(gateway: &SecurityGateway, line: &str) -> Output {
    let record: InputRecord = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(e) => return Output::Invalid { error: e.to_string() },
    };

    match record {
        InputRecord::Message(message) => match gateway.admit(&message) {
            Ok(admission) => Output::Admitted { admission },
            Err(e) => Output::Denied {
                kind: e.kind(),
                message: e.user_message(),
                retry_after_ms: e.wait_hint().map(|d| d.as_millis() as u64),
            },
        },
        InputRecord::Failure { error, context } => {
            let outcome = gateway.handle_error(&error, &context);
            let message = (!outcome.handled).then(|| outcome.to_error().user_message());
            Output::Failure { outcome, message }
        }
        InputRecord::Report => Output::Report {
            report: gateway.generate_security_report(),
        },
        InputRecord::Stats => Output::Stats {
            stats: gateway.get_stats(),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.generate_key {
        println!("{}", generate_key());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "message-gate starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut gateway = SecurityGateway::new(config.clone(), Arc::new(SystemClock));
    match PayloadCipher::from_env(&config.crypto.key_env) {
        Ok(cipher) => {
            gateway = gateway.with_cipher(cipher);
            tracing::info!("Payload encryption enabled");
        }
        Err(e) => tracing::info!(reason = %e, "Payload encryption disabled"),
    }
    let gateway = Arc::new(gateway);

    let shutdown = Shutdown::new();
    let mut tasks = spawn_maintenance(gateway.clone(), &config.maintenance, &shutdown);

    let _watcher = match (&cli.config, cli.no_watch) {
        (Some(path), false) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let gateway = gateway.clone();
            let mut stop = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = updates.recv() => match update {
                            Some(Ok(new_config)) => gateway.apply_config(new_config),
                            Some(Err(e)) => tracing::error!(
                                error = %e,
                                "Config change rejected, keeping current configuration"
                            ),
                            None => break,
                        },
                        _ = stop.recv() => break,
                    }
                }
            }));
            Some(handle)
        }
        _ => None,
    };

    tracing::info!("Reading messages from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let output = evaluate(&gateway, &line);
                    let mut encoded = serde_json::to_vec(&output)?;
                    encoded.push(b'\n');
                    stdout.write_all(&encoded).await?;
                    stdout.flush().await?;
                }
                Ok(None) => {
                    tracing::info!("Input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = &mut signal => break,
        }
    }

    tracing::info!("Shutting down");
    shutdown.drain(tasks, SHUTDOWN_GRACE).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
