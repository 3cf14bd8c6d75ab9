use clap::{Parser, Subcommand};

/// Prepare and launch a model inside a running Xinference server
#[derive(Parser)]
#[command(name = "xinference-bootstrap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Readiness timeout in seconds (overrides BOOTSTRAP_READY_TIMEOUT_SECS)
    #[arg(long, global = true)]
    pub ready_timeout: Option<u64>,

    /// Readiness poll interval in seconds (overrides BOOTSTRAP_POLL_INTERVAL_SECS)
    #[arg(long, global = true)]
    pub poll_interval: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Wait for the server, sync model files, launch the model (default)
    Run,
    /// Only wait for the server's control API
    Wait,
    /// Only sync model files from object storage
    Sync,
    /// Print the resolved configuration as JSON (secrets redacted)
    Config,
}
