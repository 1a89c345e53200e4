// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Guard Ledger Node
//!
//! Entry point for the `guard-node` binary. Parses CLI arguments, loads the
//! node configuration, initializes logging and metrics, opens the ledger,
//! and serves the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the node
//! - `init`    — create the data directory, config file and ledger
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;
mod screening;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use guard_contracts::{Ledger, VerificationPolicy};
use guard_protocol::clock::SystemClock;
use guard_protocol::storage::db::LedgerDb;
use guard_protocol::Address;

use cli::{Commands, GuardNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::{MetricsState, NodeMetrics};

const CONFIG_FILE_NAME: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = GuardNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Resolves the effective configuration: the `--config` file, else
/// `config.toml` in the data directory, else defaults; then CLI flags.
fn load_config(args: &cli::RunArgs) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => {
            let data_dir = args
                .data_dir
                .clone()
                .unwrap_or_else(|| NodeConfig::default().data_dir);
            let candidate = data_dir.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                NodeConfig::from_toml_file(&candidate)?
            } else {
                NodeConfig::default()
            }
        }
    };
    args.apply_to(&mut config);
    Ok(config)
}

/// Opens (or creates) the persistent ledger under `config.data_dir`.
fn open_ledger(config: &NodeConfig) -> Result<Ledger> {
    let db_path = config.db_path();
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    let ledger = Ledger::open(
        db,
        Address::new(config.owner.as_str()),
        config.verification_policy,
        Arc::new(SystemClock),
    )
    .context("failed to open ledger")?;
    Ok(ledger)
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    logging::init_logging(
        &config.log_level,
        LogFormat::from_str_lossy(&config.log_format),
    );

    tracing::info!(
        rpc_port = config.rpc_port,
        metrics_port = config.metrics_port,
        data_dir = %config.data_dir.display(),
        policy = %config.verification_policy,
        "starting guard-node"
    );

    let ledger = open_ledger(&config)?;
    let summary = ledger.summary();
    tracing::info!(
        owner = %summary.owner,
        transactions = summary.transactions,
        events = summary.events,
        "ledger ready"
    );

    // Screening acts as the configured relayer, or the current owner.
    let screening_relayer = match Address::new(config.screening_relayer()) {
        relayer if relayer.is_zero() => summary.owner.clone(),
        relayer => relayer,
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState::new(
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            guard_protocol::config::PROTOCOL_VERSION,
        ),
        ledger,
        Arc::clone(&node_metrics),
        config.screening.clone(),
        screening_relayer,
    );

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", config.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(MetricsState {
            metrics: Arc::clone(&node_metrics),
            ledger: Arc::clone(&app_state.ledger),
        });
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("guard-node stopped");
    Ok(())
}

/// Initializes a new data directory: writes `config.toml` and creates the
/// ledger with the given owner as owner and sole relayer.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), owner = %args.owner, "initializing node");

    if Address::new(args.owner.as_str()).is_zero() {
        anyhow::bail!("--owner must name a non-null identity");
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config = NodeConfig {
        data_dir: data_dir.clone(),
        owner: args.owner.clone(),
        verification_policy: if args.strict {
            VerificationPolicy::Strict
        } else {
            VerificationPolicy::Permissive
        },
        ..NodeConfig::default()
    };

    let config_path = data_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!(
            "{} already exists; refusing to overwrite",
            config_path.display()
        );
    }
    std::fs::write(&config_path, config.to_toml_string()?)
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    let ledger = open_ledger(&config)?;
    let summary = ledger.summary();

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config         : {}", config_path.display());
    println!("  Owner          : {}", summary.owner);
    println!("  Policy         : {}", summary.verification_policy);
    println!("  Audit head     : {}", summary.audit_head);

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP/1.1 GET over a raw TCP stream; the node has no HTTP client
/// dependency.
async fn http_get(url: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let parsed: url::Url = url
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;

    let addr = format!("{}:{}", parsed.host(), parsed.port().unwrap_or(80));
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        parsed.path(),
        parsed.host(),
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("malformed HTTP response from {}", addr))?;
    let status_line = head.lines().next().unwrap_or_default();
    if !status_line.contains(" 200 ") {
        anyhow::bail!("{} returned {}", url, status_line);
    }
    Ok(body.to_string())
}

/// Prints version information to stdout.
fn print_version() {
    println!("guard-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", guard_protocol::config::PROTOCOL_VERSION);
    println!("schema     {}", guard_protocol::config::STORAGE_SCHEMA_VERSION);
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the corresponding branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Just enough URL parsing for `status`: host, port, path.
mod url {
    #[derive(Debug, PartialEq, Eq)]
    pub struct Url {
        host: String,
        port: Option<u16>,
        path: String,
    }

    impl Url {
        pub fn host(&self) -> &str {
            &self.host
        }

        pub fn port(&self) -> Option<u16> {
            self.port
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl std::str::FromStr for Url {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            if s.starts_with("https://") {
                return Err("https is not supported".into());
            }
            let rest = s.strip_prefix("http://").unwrap_or(s);

            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            if authority.is_empty() {
                return Err("missing host".into());
            }

            let (host, port) = match authority.rfind(':') {
                Some(i) => {
                    let p = authority[i + 1..]
                        .parse::<u16>()
                        .map_err(|e| format!("bad port: {}", e))?;
                    (authority[..i].to_string(), Some(p))
                }
                None => (authority.to_string(), None),
            };

            Ok(Url {
                host,
                port,
                path: path.to_string(),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_host_port_path() {
            let url: Url = "http://127.0.0.1:9841/status".parse().unwrap();
            assert_eq!(url.host(), "127.0.0.1");
            assert_eq!(url.port(), Some(9841));
            assert_eq!(url.path(), "/status");

            let url: Url = "localhost".parse().unwrap();
            assert_eq!(url.port(), None);
            assert_eq!(url.path(), "/");
        }

        #[test]
        fn rejects_https_and_bad_ports() {
            assert!("https://node/status".parse::<Url>().is_err());
            assert!("http://node:99999/".parse::<Url>().is_err());
        }
    }
}
