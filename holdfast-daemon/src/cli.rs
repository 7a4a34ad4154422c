//! CLI argument definitions for holdfast-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Holdfast container security response daemon.
///
/// Receives intrusion-detection alerts over HTTP, evaluates them against an
/// ordered policy, and dispatches enforcement actions (log, webhook, kill,
/// quarantine) against the local container runtime.
#[derive(Parser, Debug)]
#[command(name = "holdfast-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to holdfast.toml configuration file.
    #[arg(short, long, default_value = "/etc/holdfast/holdfast.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Don't execute actions, just count and log what would happen.
    #[arg(long)]
    pub dry_run: bool,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}
