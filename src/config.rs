//! Bootstrap configuration snapshot.
//!
//! All settings are read from the environment exactly once, at process start,
//! and then passed explicitly into each stage. Nothing downstream reads the
//! environment again, so tests build a [`Settings`] from a plain map through
//! [`Settings::from_lookup`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::ConfigError;

/// Persistent volume mounted on RunPod hosts.
pub const VOLUME_ROOT: &str = "/runpod-volume";

/// Container-disk data root that is remapped onto the volume when present.
const DATA_ROOT: &str = "/data";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 9997;
const DEFAULT_MODEL_NAME: &str = "Wan2.1-i2v-14B-480p";
const DEFAULT_MODEL_TYPE: &str = "video";
const DEFAULT_MODEL_DIR: &str = "models/wan2.2-i2v-a14b";
const DEFAULT_S3_REGION: &str = "eu-ro-1";
const DEFAULT_SYNC_CONCURRENCY: usize = 4;
const DEFAULT_READY_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 1800;

/// Path of the control API used both as readiness check and launch target.
pub const MODELS_PATH: &str = "v1/models";

/// Interpret an environment flag.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "y" | "on"
    )
}

/// Where the inference server's control API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    /// Base URL, always ending in `/` so relative joins keep any path prefix.
    pub base_url: Url,
    pub ready_path: &'static str,
}

impl ServerEndpoint {
    fn new(host: String, port: u16, explicit: Option<String>) -> Result<Self, ConfigError> {
        let raw = match explicit {
            Some(url) => url,
            None => format!("http://{}:{}", dial_host(&host), port),
        };

        let normalized = if raw.ends_with('/') {
            raw
        } else {
            format!("{}/", raw)
        };

        let base_url = Url::parse(&normalized).map_err(|e| ConfigError::Invalid {
            field: "XINFERENCE_ENDPOINT",
            value: normalized.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            host,
            port,
            base_url,
            ready_path: MODELS_PATH,
        })
    }

    /// Full URL of the readiness check.
    pub fn ready_url(&self) -> String {
        format!("{}{}", self.base_url, self.ready_path)
    }
}

/// Wildcard bind addresses cannot be dialed; use loopback instead.
fn dial_host(host: &str) -> &str {
    match host {
        "" | "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    }
}

/// Readiness polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Static object-store credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// What to pull from the bucket and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSpec {
    pub bucket: String,
    /// Key prefix without a leading `/`; ends in `/` unless empty.
    pub prefix: String,
    pub destination: PathBuf,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Keys relative to `prefix` that must exist locally after the sync.
    pub required_keys: Vec<String>,
    pub skip_existing: bool,
    pub concurrency: usize,
    pub credentials: Option<S3Credentials>,
}

impl SyncSpec {
    /// `s3://bucket/prefix` form used in log lines.
    pub fn source_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Normalize a key prefix into a directory-like namespace.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Parse `MODEL_REQUIRE_KEYS` into keys relative to `prefix`.
///
/// Keys that already carry the prefix are accepted and stripped.
pub fn parse_required_keys(raw: &str, prefix: &str) -> Vec<String> {
    raw.split(',')
        .map(|key| key.trim().trim_start_matches('/'))
        .filter(|key| !key.is_empty())
        .map(|key| {
            if prefix.is_empty() {
                key
            } else {
                key.strip_prefix(prefix).unwrap_or(key)
            }
        })
        .map(ToOwned::to_owned)
        .collect()
}

/// Parameters of a single "load model" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub model_name: String,
    pub model_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_in_billions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layerwise_cast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_offload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_offload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_stream: Option<bool>,
}

impl LaunchSpec {
    /// Derive the fallback spec: same model type, engine and performance
    /// flags, but none of the primary's model-specific pinning.
    pub fn fallback_for(&self, model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_type: self.model_type.clone(),
            model_uid: None,
            model_path: None,
            engine: self.engine.clone(),
            format: None,
            size_in_billions: None,
            quantization: None,
            layerwise_cast: self.layerwise_cast,
            cpu_offload: self.cpu_offload,
            group_offload: self.group_offload,
            use_stream: self.use_stream,
        }
    }
}

/// The full, immutable configuration of one bootstrap run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: ServerEndpoint,
    pub probe: ProbeSettings,
    /// `None` when `ENABLE_S3_MODEL` is off.
    pub sync: Option<SyncSpec>,
    pub auto_launch: bool,
    pub primary: LaunchSpec,
    /// `None` when no distinct fallback model is configured.
    pub fallback: Option<LaunchSpec>,
    pub launch_timeout: Duration,
    pub model_local_path: PathBuf,
}

/// Thin typed view over a variable lookup.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.string(key).map(|v| parse_bool(&v)).unwrap_or(default)
    }

    /// Flags with no default are left out of the launch request entirely.
    fn optional_flag(&self, key: &str) -> Option<bool> {
        self.string(key).map(|v| parse_bool(&v))
    }

    fn number<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.string(key) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                field: key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn positive_secs(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs: u64 = self.number(key, default)?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                field: key,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Duration::from_secs(secs))
    }
}

/// Resolve the model directory, preferring the persistent volume.
fn resolve_local_path(configured: Option<String>, volume_mounted: bool) -> PathBuf {
    match configured {
        Some(path) if volume_mounted && path.starts_with(&format!("{}/", DATA_ROOT)) => {
            PathBuf::from(path.replacen(DATA_ROOT, VOLUME_ROOT, 1))
        }
        Some(path) => PathBuf::from(path),
        None if volume_mounted => Path::new(VOLUME_ROOT).join(DEFAULT_MODEL_DIR),
        None => Path::new(DATA_ROOT).join(DEFAULT_MODEL_DIR),
    }
}

impl Settings {
    /// Snapshot the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let volume_mounted = Path::new(VOLUME_ROOT).is_dir();
        Self::from_lookup(|key| std::env::var(key).ok(), volume_mounted)
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, volume_mounted: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let host = env
            .string("XINFERENCE_HOST")
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = env.number("XINFERENCE_PORT", DEFAULT_PORT)?;
        let endpoint = ServerEndpoint::new(host, port, env.string("XINFERENCE_ENDPOINT"))?;

        let probe = ProbeSettings {
            timeout: env.positive_secs("BOOTSTRAP_READY_TIMEOUT_SECS", DEFAULT_READY_TIMEOUT_SECS)?,
            poll_interval: env
                .positive_secs("BOOTSTRAP_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
        };

        let explicit_local_path = env.string("MODEL_LOCAL_PATH");
        let local_path_was_set = explicit_local_path.is_some();
        let model_local_path = resolve_local_path(explicit_local_path, volume_mounted);

        let sync = if env.flag("ENABLE_S3_MODEL", true) {
            let bucket = env
                .string("MODEL_S3_BUCKET")
                .ok_or(ConfigError::Missing("MODEL_S3_BUCKET"))?;
            let prefix = normalize_prefix(&env.string("MODEL_S3_PREFIX").unwrap_or_default());
            let required_keys =
                parse_required_keys(&env.string("MODEL_REQUIRE_KEYS").unwrap_or_default(), &prefix);
            let concurrency: usize =
                env.number("MODEL_SYNC_CONCURRENCY", DEFAULT_SYNC_CONCURRENCY)?;
            let credentials = match (
                env.string("AWS_ACCESS_KEY_ID"),
                env.string("AWS_SECRET_ACCESS_KEY"),
            ) {
                (Some(access_key_id), Some(secret_access_key)) => Some(S3Credentials {
                    access_key_id,
                    secret_access_key,
                }),
                _ => None,
            };

            Some(SyncSpec {
                bucket,
                prefix,
                destination: model_local_path.clone(),
                region: Some(
                    env.string("MODEL_S3_REGION")
                        .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
                ),
                endpoint: env.string("MODEL_S3_ENDPOINT"),
                required_keys,
                skip_existing: env.flag("MODEL_SKIP_EXISTING", true),
                concurrency: concurrency.max(1),
                credentials,
            })
        } else {
            None
        };

        let model_path = env.string("VIDEO_MODEL_PATH").or_else(|| {
            (sync.is_some() || local_path_was_set)
                .then(|| model_local_path.to_string_lossy().into_owned())
        });

        let primary = LaunchSpec {
            model_name: env
                .string("VIDEO_MODEL_NAME")
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            model_type: env
                .string("VIDEO_MODEL_TYPE")
                .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_string()),
            model_uid: env.string("VIDEO_MODEL_UID"),
            model_path,
            engine: env.string("VIDEO_MODEL_ENGINE"),
            format: env.string("VIDEO_MODEL_FORMAT"),
            size_in_billions: env.string("VIDEO_SIZE_IN_BILLIONS"),
            quantization: env.string("VIDEO_QUANTIZATION"),
            layerwise_cast: env.optional_flag("VIDEO_LAYERWISE_CAST"),
            cpu_offload: env.optional_flag("VIDEO_CPU_OFFLOAD"),
            group_offload: env.optional_flag("VIDEO_GROUP_OFFLOAD"),
            use_stream: env.optional_flag("VIDEO_USE_STREAM"),
        };

        let fallback = env
            .string("VIDEO_FALLBACK_MODEL")
            .filter(|name| *name != primary.model_name)
            .map(|name| primary.fallback_for(name));

        Ok(Self {
            endpoint,
            probe,
            sync,
            auto_launch: env.flag("AUTO_LAUNCH_MODEL", true),
            primary,
            fallback,
            launch_timeout: env
                .positive_secs("XINFERENCE_LAUNCH_TIMEOUT_SECS", DEFAULT_LAUNCH_TIMEOUT_SECS)?,
            model_local_path,
        })
    }

    /// Apply command-line overrides to the readiness policy.
    pub fn with_probe_overrides(
        mut self,
        ready_timeout_secs: Option<u64>,
        poll_interval_secs: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let overrides = [
            ("--ready-timeout", ready_timeout_secs, &mut self.probe.timeout),
            ("--poll-interval", poll_interval_secs, &mut self.probe.poll_interval),
        ];
        for (field, value, slot) in overrides {
            match value {
                Some(0) => {
                    return Err(ConfigError::Invalid {
                        field,
                        value: "0".to_string(),
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Some(secs) => *slot = Duration::from_secs(secs),
                None => {}
            }
        }
        Ok(self)
    }

    /// Resolved settings as JSON, with credentials redacted.
    pub fn redacted_json(&self) -> serde_json::Value {
        let sync = self.sync.as_ref().map(|spec| {
            serde_json::json!({
                "bucket": spec.bucket,
                "prefix": spec.prefix,
                "destination": spec.destination,
                "region": spec.region,
                "endpoint": spec.endpoint,
                "required_keys": spec.required_keys,
                "skip_existing": spec.skip_existing,
                "concurrency": spec.concurrency,
                "credentials": spec.credentials.as_ref().map(|c| serde_json::json!({
                    "access_key_id": c.access_key_id,
                    "secret_access_key": "<redacted>",
                })),
            })
        });

        serde_json::json!({
            "endpoint": self.endpoint.base_url.as_str(),
            "ready_url": self.endpoint.ready_url(),
            "ready_timeout_secs": self.probe.timeout.as_secs(),
            "poll_interval_secs": self.probe.poll_interval.as_secs(),
            "sync": sync,
            "auto_launch": self.auto_launch,
            "primary": self.primary,
            "fallback": self.fallback,
            "launch_timeout_secs": self.launch_timeout.as_secs(),
            "model_local_path": self.model_local_path,
        })
    }
}
