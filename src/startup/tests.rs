//! Tests for the bootstrap pipeline.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::{ObjectStore, PutPayload};
    use tempfile::TempDir;

    use crate::artifacts::{ArtifactStore, ObjectStoreArtifacts};
    use crate::config::{LaunchSpec, Settings};
    use crate::error::{
        BootstrapError, SyncError, EXIT_LAUNCH_FAILED, EXIT_OK, EXIT_READINESS_TIMEOUT,
        EXIT_SYNC_FAILED,
    };
    use crate::startup::launch::LaunchRole;
    use crate::startup::ensure::StageStatus;
    use crate::startup::{Bootstrap, BootstrapOutcome, ModelLauncher, ReadinessProbe};

    struct FakeProbe {
        ready: bool,
        calls: AtomicU32,
    }

    impl FakeProbe {
        fn ready() -> Arc<Self> {
            Arc::new(Self {
                ready: true,
                calls: AtomicU32::new(0),
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                ready: false,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ReadinessProbe for FakeProbe {
        fn target(&self) -> String {
            "fake://xinference/v1/models".to_string()
        }

        async fn probe(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ready {
                Ok(())
            } else {
                anyhow::bail!("connection refused")
            }
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        reject: Vec<String>,
        sent: Mutex<Vec<LaunchSpec>>,
    }

    impl RecordingLauncher {
        fn rejecting(models: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                reject: models.iter().map(|m| m.to_string()).collect(),
                ..Default::default()
            })
        }

        fn sent(&self) -> Vec<LaunchSpec> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelLauncher for RecordingLauncher {
        async fn launch_model(&self, spec: &LaunchSpec) -> Result<String> {
            self.sent.lock().unwrap().push(spec.clone());
            if self.reject.contains(&spec.model_name) {
                anyhow::bail!("unsupported engine for {}", spec.model_name);
            }
            Ok(format!("{}-uid", spec.model_name))
        }
    }

    async fn bucket(objects: &[(&str, &str)]) -> Arc<dyn ArtifactStore> {
        let memory = Arc::new(InMemory::new());
        for (key, body) in objects {
            memory
                .put(
                    &ObjectPath::from(*key),
                    PutPayload::from(body.as_bytes().to_vec()),
                )
                .await
                .unwrap();
        }
        Arc::new(ObjectStoreArtifacts::new(memory, "memory://models"))
    }

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned(), false).unwrap()
    }

    fn sync_vars(local_path: &Path) -> Vec<(&'static str, String)> {
        vec![
            ("ENABLE_S3_MODEL", "1".to_string()),
            ("MODEL_S3_BUCKET", "models".to_string()),
            ("MODEL_S3_PREFIX", "m/".to_string()),
            ("MODEL_LOCAL_PATH", local_path.to_string_lossy().into_owned()),
            ("VIDEO_MODEL_NAME", "Wan2.2-i2v-A14B".to_string()),
            ("VIDEO_FALLBACK_MODEL", "Wan2.1-i2v-14B-480p".to_string()),
        ]
    }

    fn with_extra(base: Vec<(&'static str, String)>, extra: &[(&'static str, &str)]) -> Settings {
        let mut vars = base;
        vars.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));
        let borrowed: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
        settings(&borrowed)
    }

    #[tokio::test]
    async fn test_end_to_end_sync_then_launch() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("data/m");
        let store = bucket(&[("m/weights.bin", "WEIGHTS"), ("m/config.json", "{\"a\":1}")]).await;
        let launcher = Arc::new(RecordingLauncher::default());

        let mut bootstrap = Bootstrap::with_components(
            with_extra(sync_vars(&local), &[]),
            FakeProbe::ready(),
            Some(store),
            launcher.clone(),
        );

        let outcome = bootstrap.run().await.unwrap();

        assert_eq!(std::fs::read_to_string(local.join("weights.bin")).unwrap(), "WEIGHTS");
        assert_eq!(
            std::fs::read_to_string(local.join("config.json")).unwrap(),
            "{\"a\":1}"
        );

        let sent = launcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].model_path,
            Some(local.to_string_lossy().into_owned())
        );

        match outcome {
            BootstrapOutcome::Launched(model) => {
                assert_eq!(model.role, LaunchRole::Primary);
                assert_eq!(model.model_uid(), Some("Wan2.2-i2v-A14B-uid"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(bootstrap.ready_status(), &StageStatus::Success);
        assert_eq!(bootstrap.sync_status(), &StageStatus::Success);
        assert_eq!(bootstrap.launch_status(), &StageStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        let probe = FakeProbe::down();
        let launcher = Arc::new(RecordingLauncher::default());

        let mut bootstrap = Bootstrap::with_components(
            with_extra(
                sync_vars(dir.path()),
                &[
                    ("BOOTSTRAP_READY_TIMEOUT_SECS", "5"),
                    ("BOOTSTRAP_POLL_INTERVAL_SECS", "1"),
                ],
            ),
            probe.clone(),
            Some(bucket(&[("m/weights.bin", "W")]).await),
            launcher.clone(),
        );

        let err = bootstrap.run().await.unwrap_err();

        assert_eq!(err.exit_code(), EXIT_READINESS_TIMEOUT);
        assert!(probe.calls.load(Ordering::SeqCst) <= 5);
        assert!(matches!(bootstrap.ready_status(), StageStatus::Failed(_)));
        assert_eq!(bootstrap.sync_status(), &StageStatus::NotStarted);
        assert_eq!(bootstrap.launch_status(), &StageStatus::NotStarted);
        assert!(launcher.sent().is_empty());
        assert!(!dir.path().join("weights.bin").exists());
    }

    #[tokio::test]
    async fn test_missing_required_artifact_blocks_launch() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());

        let mut bootstrap = Bootstrap::with_components(
            with_extra(
                sync_vars(dir.path()),
                &[("MODEL_REQUIRE_KEYS", "a/b.safetensors")],
            ),
            FakeProbe::ready(),
            Some(bucket(&[("m/weights.bin", "W")]).await),
            launcher.clone(),
        );

        let err = bootstrap.run().await.unwrap_err();

        assert_eq!(err.exit_code(), EXIT_SYNC_FAILED);
        assert!(matches!(
            err,
            BootstrapError::Sync(SyncError::MissingRequiredArtifact(ref key)) if key == "a/b.safetensors"
        ));
        assert!(launcher.sent().is_empty());
        assert_eq!(bootstrap.launch_status(), &StageStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_fallback_reported_when_primary_rejected() {
        let dir = TempDir::new().unwrap();
        let launcher = RecordingLauncher::rejecting(&["Wan2.2-i2v-A14B"]);

        let mut bootstrap = Bootstrap::with_components(
            with_extra(sync_vars(dir.path()), &[]),
            FakeProbe::ready(),
            Some(bucket(&[("m/weights.bin", "W")]).await),
            launcher.clone(),
        );

        let outcome = bootstrap.run().await.unwrap();

        match outcome {
            BootstrapOutcome::Launched(model) => {
                assert_eq!(model.role, LaunchRole::Fallback);
                assert_eq!(model.spec.model_name, "Wan2.1-i2v-14B-480p");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(launcher.sent().len(), 2);
        assert_eq!(launcher.sent()[1].model_path, None);
    }

    #[tokio::test]
    async fn test_both_launches_rejected_is_fatal() {
        let dir = TempDir::new().unwrap();
        let launcher = RecordingLauncher::rejecting(&["Wan2.2-i2v-A14B", "Wan2.1-i2v-14B-480p"]);

        let mut bootstrap = Bootstrap::with_components(
            with_extra(sync_vars(dir.path()), &[]),
            FakeProbe::ready(),
            Some(bucket(&[("m/weights.bin", "W")]).await),
            launcher.clone(),
        );

        let err = bootstrap.run().await.unwrap_err();

        assert_eq!(err.exit_code(), EXIT_LAUNCH_FAILED);
        assert_ne!(err.exit_code(), EXIT_OK);
        assert!(matches!(bootstrap.launch_status(), StageStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_auto_launch_disabled_still_syncs() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());

        let mut bootstrap = Bootstrap::with_components(
            with_extra(sync_vars(dir.path()), &[("AUTO_LAUNCH_MODEL", "0")]),
            FakeProbe::ready(),
            Some(bucket(&[("m/weights.bin", "W")]).await),
            launcher.clone(),
        );

        let outcome = bootstrap.run().await.unwrap();

        assert!(matches!(outcome, BootstrapOutcome::LaunchDisabled));
        assert_eq!(outcome.exit_code(), EXIT_OK);
        assert!(dir.path().join("weights.bin").exists());
        assert!(launcher.sent().is_empty());
        assert_eq!(bootstrap.launch_status(), &StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_sync_disabled_goes_straight_to_launch() {
        let launcher = Arc::new(RecordingLauncher::default());

        let mut bootstrap = Bootstrap::with_components(
            settings(&[("ENABLE_S3_MODEL", "0")]),
            FakeProbe::ready(),
            None,
            launcher.clone(),
        );

        bootstrap.run().await.unwrap();

        assert_eq!(bootstrap.sync_status(), &StageStatus::Skipped);
        assert_eq!(launcher.sent().len(), 1);
        assert_eq!(launcher.sent()[0].model_path, None);
    }

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Success.to_string(), "ok");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
        assert_eq!(StageStatus::Failed("boom".to_string()).to_string(), "failed");
    }
}
