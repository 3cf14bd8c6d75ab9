//! Model launcher with a single fallback attempt.
//!
//! Each attempt is made exactly once. There is no retry loop around a single
//! spec: a GPU or driver problem should surface as a failed bootstrap, not be
//! hidden behind repeated attempts.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::LaunchSpec;
use crate::error::LaunchError;

/// Server capability that loads a model and makes it servable.
#[async_trait]
pub trait ModelLauncher: Send + Sync {
    /// Launch `spec` and return the uid the server assigned to it.
    async fn launch_model(&self, spec: &LaunchSpec) -> Result<String>;
}

/// Which of the two specs ended up serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchRole {
    Primary,
    Fallback,
}

impl fmt::Display for LaunchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchRole::Primary => write!(f, "primary"),
            LaunchRole::Fallback => write!(f, "fallback"),
        }
    }
}

/// How a successful attempt was acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchAck {
    Launched { model_uid: String },
    /// The server reported the model as already launched.
    AlreadyRunning { detail: String },
}

/// The model that is actually serving after the launcher returns.
#[derive(Debug, Clone)]
pub struct LaunchedModel {
    pub role: LaunchRole,
    pub spec: LaunchSpec,
    pub ack: LaunchAck,
}

impl LaunchedModel {
    pub fn model_uid(&self) -> Option<&str> {
        match &self.ack {
            LaunchAck::Launched { model_uid } => Some(model_uid),
            LaunchAck::AlreadyRunning { .. } => None,
        }
    }
}

fn is_already_running(err: &anyhow::Error) -> bool {
    let message = format!("{:#}", err).to_lowercase();
    message.contains("already launched") || message.contains("already exists")
}

async fn attempt(launcher: &dyn ModelLauncher, spec: &LaunchSpec) -> Result<LaunchAck> {
    match launcher.launch_model(spec).await {
        Ok(model_uid) => Ok(LaunchAck::Launched { model_uid }),
        Err(e) if is_already_running(&e) => Ok(LaunchAck::AlreadyRunning {
            detail: format!("{:#}", e),
        }),
        Err(e) => Err(e),
    }
}

fn log_success(role: LaunchRole, spec: &LaunchSpec, ack: &LaunchAck) {
    match ack {
        LaunchAck::Launched { model_uid } => {
            info!(
                "✅ Launched {} model '{}' as {}",
                role, spec.model_name, model_uid
            );
        }
        LaunchAck::AlreadyRunning { detail } => {
            info!(
                "✅ {} model '{}' is already running: {}",
                role, spec.model_name, detail
            );
        }
    }
}

/// Launch `primary`, falling back to `fallback` exactly once on any error.
pub async fn launch_with_fallback(
    launcher: &dyn ModelLauncher,
    primary: &LaunchSpec,
    fallback: Option<&LaunchSpec>,
) -> Result<LaunchedModel, LaunchError> {
    info!("🚀 Launching model '{}'...", primary.model_name);

    let primary_cause = match attempt(launcher, primary).await {
        Ok(ack) => {
            log_success(LaunchRole::Primary, primary, &ack);
            return Ok(LaunchedModel {
                role: LaunchRole::Primary,
                spec: primary.clone(),
                ack,
            });
        }
        Err(e) => e,
    };

    let Some(fallback) = fallback else {
        error!(
            "❌ Launch of '{}' failed: {:#}",
            primary.model_name, primary_cause
        );
        return Err(LaunchError::PrimaryFailed {
            model: primary.model_name.clone(),
            cause: primary_cause,
        });
    };

    warn!(
        "⚠️  Primary model '{}' failed ({:#}); attempting fallback '{}'",
        primary.model_name, primary_cause, fallback.model_name
    );

    match attempt(launcher, fallback).await {
        Ok(ack) => {
            log_success(LaunchRole::Fallback, fallback, &ack);
            Ok(LaunchedModel {
                role: LaunchRole::Fallback,
                spec: fallback.clone(),
                ack,
            })
        }
        Err(fallback_cause) => {
            error!(
                "❌ Fallback model '{}' failed too: {:#}",
                fallback.model_name, fallback_cause
            );
            Err(LaunchError::BothFailed {
                primary: primary_cause,
                fallback: fallback_cause,
            })
        }
    }
}
