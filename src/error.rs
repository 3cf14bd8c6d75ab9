//! Error taxonomy for the bootstrap pipeline.
//!
//! Every error here is fatal to the bootstrap run. The only recovery the
//! pipeline performs is the single fallback launch inside the launcher, and
//! that happens before a `LaunchError` is ever produced.
//!
//! ## Exit codes
//!
//! | Outcome | Code |
//! |---|---|
//! | success / launch disabled | 0 |
//! | configuration error | 2 |
//! | readiness timeout | 3 |
//! | artifact sync failure | 4 |
//! | launch failure | 5 |
//! | SIGINT / SIGTERM | 130 / 143 (see `signal`) |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const EXIT_OK: u8 = 0;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_READINESS_TIMEOUT: u8 = 3;
pub const EXIT_SYNC_FAILED: u8 = 4;
pub const EXIT_LAUNCH_FAILED: u8 = 5;

/// Invalid or incomplete configuration snapshot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{field} has an invalid value {value:?}: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to configure the object store client: {0:#}")]
    ObjectStore(anyhow::Error),
    #[error("failed to configure the control API client: {0:#}")]
    HttpClient(anyhow::Error),
}

impl ConfigError {
    /// Name of the offending setting, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::Missing(field) => Some(*field),
            ConfigError::Invalid { field, .. } => Some(*field),
            ConfigError::ObjectStore(_) => Some("MODEL_S3_ENDPOINT"),
            ConfigError::HttpClient(_) => None,
        }
    }
}

/// The inference server never became reachable.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error(
        "timed out after {elapsed:?} waiting for {target} ({attempts} attempt(s)){}",
        last_error_suffix(.last_error)
    )]
    Timeout {
        target: String,
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(err) => format!("; last error: {err}"),
        None => String::new(),
    }
}

/// Artifact synchronization failure.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to prepare destination {}: {cause:#}", .path.display())]
    Destination { path: PathBuf, cause: anyhow::Error },
    #[error("failed to list remote objects: {0:#}")]
    Listing(anyhow::Error),
    #[error("failed to transfer '{key}': {cause:#}")]
    Transfer { key: String, cause: anyhow::Error },
    #[error("required artifact '{0}' is missing")]
    MissingRequiredArtifact(String),
    #[error("object key '{0}' does not map to a path inside the destination")]
    InvalidKey(String),
}

/// Model launch failure after the fallback (if any) was tried.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("launch of '{model}' failed and no fallback model is configured: {cause:#}")]
    PrimaryFailed { model: String, cause: anyhow::Error },
    #[error("primary launch failed ({primary:#}); fallback launch failed ({fallback:#})")]
    BothFailed {
        primary: anyhow::Error,
        fallback: anyhow::Error,
    },
}

/// Terminal failure of a bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("readiness check failed: {0}")]
    Readiness(#[from] ReadinessError),
    #[error("model sync failed: {0}")]
    Sync(#[from] SyncError),
    #[error("model launch failed: {0}")]
    Launch(#[from] LaunchError),
}

impl BootstrapError {
    /// Process exit status a supervisor can act on.
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::Config(_) => EXIT_CONFIG,
            BootstrapError::Readiness(_) => EXIT_READINESS_TIMEOUT,
            BootstrapError::Sync(_) => EXIT_SYNC_FAILED,
            BootstrapError::Launch(_) => EXIT_LAUNCH_FAILED,
        }
    }

    /// Short stage label used in the final log line.
    pub fn stage(&self) -> &'static str {
        match self {
            BootstrapError::Config(_) => "config",
            BootstrapError::Readiness(_) => "readiness",
            BootstrapError::Sync(_) => "sync",
            BootstrapError::Launch(_) => "launch",
        }
    }
}
