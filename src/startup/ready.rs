//! Readiness prober: fixed-interval polling with a hard deadline.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::ReadinessError;

/// Something that can tell whether the inference server is up.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Human-readable probe target, used in logs and errors.
    fn target(&self) -> String;

    /// One probe attempt. `Ok` means ready.
    async fn probe(&self) -> Result<()>;
}

/// Poll `probe` every `poll_interval` until it succeeds or `timeout` elapses.
///
/// Returns the number of attempts it took. Each probe is bounded by the time
/// left, and the wait after the last failed probe is cut short at the
/// deadline, so the timeout is reported once `timeout` has passed and no
/// earlier. No attempt is started at the deadline itself; with a 5s timeout
/// and 1s interval that means at most 5 attempts.
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<u32, ReadinessError> {
    let target = probe.target();
    let started = Instant::now();
    let mut attempts = 0u32;

    info!("⏳ Waiting for inference server at {}...", target);

    let last_error = loop {
        attempts += 1;
        let remaining = timeout.saturating_sub(started.elapsed());

        let outcome = match tokio::time::timeout(remaining, probe.probe()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("probe did not complete within {:?}", remaining)),
        };

        let error = match outcome {
            Ok(()) => {
                info!(
                    "✅ Inference server is ready ({} attempt(s), {:?})",
                    attempts,
                    started.elapsed()
                );
                return Ok(attempts);
            }
            Err(e) => format!("{:#}", e),
        };
        debug!("Readiness attempt {} failed: {}", attempts, error);

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break error;
        }

        if attempts % 10 == 0 {
            info!(
                "   Still waiting for {} ({:?} elapsed)",
                target,
                started.elapsed()
            );
        }

        sleep(poll_interval.min(remaining)).await;
        if started.elapsed() >= timeout {
            break error;
        }
    };

    let elapsed = started.elapsed();
    warn!(
        "❌ Inference server not ready after {:?} ({} attempt(s))",
        elapsed, attempts
    );
    Err(ReadinessError::Timeout {
        target,
        attempts,
        elapsed,
        last_error: Some(last_error),
    })
}
