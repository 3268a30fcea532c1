use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::guard::Guard;
use turnstile::ratelimit::{RateLimiter, WindowStore};

/// Sliding-window rate limiter.
///
/// Reads `<policy> <identifier>` lines from stdin and writes one JSON
/// admission decision per line to stdout.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version)]
struct Cli {
    /// Path to a YAML or TOML configuration file
    #[arg(long, env = "TURNSTILE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// A query read from stdin.
struct Query {
    identifier: String,
}

type QueryGuard = Guard<fn(&Query) -> String>;

#[derive(Serialize)]
struct DecisionLine<'a> {
    policy: &'a str,
    identifier: &'a str,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn query_identifier(query: &Query) -> String {
    query.identifier.clone()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Turnstile rate limiter");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TurnstileConfig::load(cli.config.as_deref())?;
    info!(
        failure_mode = ?config.limiter.failure_mode,
        max_keys = config.limiter.max_keys,
        policies = config.policies.len(),
        "Configuration loaded"
    );

    let registry = config.build_registry()?;

    let store = Arc::new(WindowStore::from_config(&config.limiter));
    let sweeper = store.spawn_sweeper(Duration::from_secs(config.limiter.sweep_interval_secs));
    let limiter = Arc::new(RateLimiter::new(store.clone(), config.limiter.failure_mode));
    info!("Rate limiter initialized");

    // Resolve every policy up front so a bad catalogue fails before serving.
    let mut guards: HashMap<String, QueryGuard> = HashMap::new();
    for name in registry.names() {
        let extractor: fn(&Query) -> String = query_identifier;
        guards.insert(name.to_string(), Guard::new(&registry, limiter.clone(), name, extractor)?);
    }

    tokio::select! {
        result = serve_stdin(&guards) => result?,
        _ = shutdown_signal() => {}
    }

    sweeper.abort();
    info!(tracked_keys = store.len(), "Turnstile rate limiter stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Answer queries from stdin until EOF.
async fn serve_stdin(guards: &HashMap<String, QueryGuard>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let (Some(policy), identifier) = (parts.next(), parts.next().unwrap_or_default()) else {
            continue;
        };

        let mut decision = DecisionLine {
            policy,
            identifier,
            allowed: false,
            remaining: None,
            retry_after_secs: None,
            error: None,
        };

        match guards.get(policy) {
            Some(guard) => {
                let query = Query {
                    identifier: identifier.to_string(),
                };
                match guard.admit(&query).await {
                    Ok(admitted) => {
                        decision.allowed = true;
                        decision.remaining = Some(admitted.remaining);
                    }
                    Err(exceeded) => {
                        decision.retry_after_secs = Some(exceeded.retry_after_secs());
                    }
                }
            }
            None => {
                warn!(policy = policy, "Query references unknown policy");
                decision.error = Some(format!("unknown policy `{}`", policy));
            }
        }

        let mut out = serde_json::to_vec(&decision)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("Input closed");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
