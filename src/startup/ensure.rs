//! Bootstrap pipeline: readiness, artifacts, model.
//!
//! ```text
//! ensure_ready()      // control API answers GET /v1/models
//! ensure_artifacts()  // weights mirrored from the bucket (if enabled)
//! ensure_model()      // primary launched, else fallback (if enabled)
//! ```
//!
//! Stages run strictly in order and are never re-entered. The first failure
//! ends the run with a [`BootstrapError`] whose exit code tells the supervisor
//! which stage broke.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use super::launch::{launch_with_fallback, LaunchedModel, ModelLauncher};
use super::ready::{wait_until_ready, ReadinessProbe};
use crate::api::XinferenceClient;
use crate::artifacts::{self, ArtifactStore, ObjectStoreArtifacts, SyncReport};
use crate::config::Settings;
use crate::error::{BootstrapError, ConfigError, EXIT_OK};

/// State of each pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Success,
    /// Disabled by configuration.
    Skipped,
    Failed(String),
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::NotStarted => write!(f, "not started"),
            StageStatus::InProgress => write!(f, "in progress"),
            StageStatus::Success => write!(f, "ok"),
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Failed(_) => write!(f, "failed"),
        }
    }
}

/// Terminal outcome of a successful run.
#[derive(Debug, Clone)]
pub enum BootstrapOutcome {
    Launched(LaunchedModel),
    /// `AUTO_LAUNCH_MODEL=0`: server left with no model loaded.
    LaunchDisabled,
}

impl BootstrapOutcome {
    pub fn exit_code(&self) -> u8 {
        EXIT_OK
    }
}

pub type BootstrapResult = Result<BootstrapOutcome, BootstrapError>;

/// Drives the three stages against injected collaborators.
pub struct Bootstrap {
    settings: Settings,
    probe: Arc<dyn ReadinessProbe>,
    store: Option<Arc<dyn ArtifactStore>>,
    launcher: Arc<dyn ModelLauncher>,
    ready_status: StageStatus,
    sync_status: StageStatus,
    launch_status: StageStatus,
}

impl Bootstrap {
    /// Wire up the real HTTP client and S3 store from `settings`.
    pub fn new(settings: Settings) -> Result<Self, BootstrapError> {
        let client = Arc::new(
            XinferenceClient::new(settings.endpoint.base_url.clone(), settings.launch_timeout)
                .map_err(ConfigError::HttpClient)?,
        );

        let store: Option<Arc<dyn ArtifactStore>> = match settings.sync {
            Some(ref spec) => Some(Arc::new(
                ObjectStoreArtifacts::s3(spec).map_err(ConfigError::ObjectStore)?,
            )),
            None => None,
        };

        Ok(Self::with_components(settings, client.clone(), store, client))
    }

    /// Build a pipeline around explicit collaborators.
    pub fn with_components(
        settings: Settings,
        probe: Arc<dyn ReadinessProbe>,
        store: Option<Arc<dyn ArtifactStore>>,
        launcher: Arc<dyn ModelLauncher>,
    ) -> Self {
        Self {
            settings,
            probe,
            store,
            launcher,
            ready_status: StageStatus::NotStarted,
            sync_status: StageStatus::NotStarted,
            launch_status: StageStatus::NotStarted,
        }
    }

    /// Stage 1: wait for the control API.
    pub async fn ensure_ready(&mut self) -> Result<(), BootstrapError> {
        self.ready_status = StageStatus::InProgress;

        match wait_until_ready(
            self.probe.as_ref(),
            self.settings.probe.timeout,
            self.settings.probe.poll_interval,
        )
        .await
        {
            Ok(_) => {
                self.ready_status = StageStatus::Success;
                Ok(())
            }
            Err(e) => {
                self.ready_status = StageStatus::Failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Stage 2: mirror weights locally. `None` when sync is disabled.
    pub async fn ensure_artifacts(&mut self) -> Result<Option<SyncReport>, BootstrapError> {
        let (Some(spec), Some(store)) = (self.settings.sync.as_ref(), self.store.as_ref()) else {
            info!("☁️  S3 model sync disabled; skipping");
            self.sync_status = StageStatus::Skipped;
            return Ok(None);
        };

        self.sync_status = StageStatus::InProgress;
        match artifacts::sync(store.as_ref(), spec).await {
            Ok(report) => {
                self.sync_status = StageStatus::Success;
                Ok(Some(report))
            }
            Err(e) => {
                self.sync_status = StageStatus::Failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Stage 3: launch the model, with fallback.
    pub async fn ensure_model(&mut self) -> Result<BootstrapOutcome, BootstrapError> {
        if !self.settings.auto_launch {
            info!("⏸️  Auto-launch disabled; server left with no model loaded");
            self.launch_status = StageStatus::Skipped;
            return Ok(BootstrapOutcome::LaunchDisabled);
        }

        self.launch_status = StageStatus::InProgress;
        match launch_with_fallback(
            self.launcher.as_ref(),
            &self.settings.primary,
            self.settings.fallback.as_ref(),
        )
        .await
        {
            Ok(launched) => {
                self.launch_status = StageStatus::Success;
                Ok(BootstrapOutcome::Launched(launched))
            }
            Err(e) => {
                self.launch_status = StageStatus::Failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Run all stages and return the terminal outcome.
    pub async fn run(&mut self) -> BootstrapResult {
        let result = self.run_stages().await;

        match &result {
            Ok(BootstrapOutcome::Launched(model)) => info!(
                "🎬 Bootstrap complete: serving {} model '{}' (uid: {})",
                model.role,
                model.spec.model_name,
                model.model_uid().unwrap_or("already running")
            ),
            Ok(BootstrapOutcome::LaunchDisabled) => {
                info!("🎬 Bootstrap complete: no model launched")
            }
            Err(e) => error!(
                "💥 Bootstrap failed at {} stage (exit {}): {}",
                e.stage(),
                e.exit_code(),
                e
            ),
        }
        info!(
            "   Stages: ready {}, sync {}, launch {}",
            self.ready_status(),
            self.sync_status(),
            self.launch_status()
        );

        result
    }

    async fn run_stages(&mut self) -> BootstrapResult {
        self.ensure_ready().await?;
        self.ensure_artifacts().await?;
        self.ensure_model().await
    }

    pub fn ready_status(&self) -> &StageStatus {
        &self.ready_status
    }

    pub fn sync_status(&self) -> &StageStatus {
        &self.sync_status
    }

    pub fn launch_status(&self) -> &StageStatus {
        &self.launch_status
    }
}
