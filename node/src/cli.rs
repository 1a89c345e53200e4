//! # CLI Interface
//!
//! Defines the command-line argument structure for `guard-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use guard_protocol::config::DEFAULT_RPC_PORT;

use crate::config::NodeConfig;

/// Guard ledger node.
///
/// Serves an access-controlled, append-only transaction ledger over REST,
/// JSON-RPC, and WebSocket, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "guard-node",
    about = "Guard transaction ledger node",
    version,
    propagate_version = true
)]
pub struct GuardNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a new node: creates the data directory, writes a default
    /// `config.toml`, and creates the ledger with the given owner.
    Init(InitArgs),
    /// Query the status of a running node via its API endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand. Flags override the config file.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, the node looks for `config.toml` in the data directory.
    #[arg(long, short = 'c', env = "GUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the node data directory where the ledger is stored.
    #[arg(long, short = 'd', env = "GUARD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the REST / JSON-RPC / WebSocket API.
    #[arg(long, env = "GUARD_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "GUARD_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Initial owner, used only when the ledger does not exist yet.
    #[arg(long, env = "GUARD_OWNER")]
    pub owner: Option<String>,

    /// Log format: "pretty" or "json".
    #[arg(long, env = "GUARD_LOG_FORMAT")]
    pub log_format: Option<String>,
}

impl RunArgs {
    /// Applies every flag that was given on top of `config`.
    pub fn apply_to(&self, config: &mut NodeConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(owner) = &self.owner {
            config.owner = owner.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
    }
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "GUARD_DATA_DIR", default_value = "./guard_data")]
    pub data_dir: PathBuf,

    /// Identity that becomes owner and sole relayer.
    #[arg(long, env = "GUARD_OWNER")]
    pub owner: String,

    /// Create the ledger with the strict verification policy.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running node.
    #[arg(long, default_value_t = format!("http://127.0.0.1:{DEFAULT_RPC_PORT}"))]
    pub rpc_url: String,
}
