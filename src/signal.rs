//! Termination signals.
//!
//! The bootstrap future is raced against [`shutdown_signal`]; when a signal
//! wins, the in-flight stage is dropped (partial downloads clean themselves
//! up) and the process exits with a signal-specific status so a supervisor
//! can tell "stopped" apart from "failed".

use std::fmt;
use std::future::Future;

use tracing::warn;

use crate::error::BootstrapError;

/// Which signal stopped the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    /// Conventional `128 + signo` status.
    pub fn exit_code(self) -> u8 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Wait for SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() -> ShutdownSignal {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = interrupt() => ShutdownSignal::Interrupt,
                _ = terminate.recv() => ShutdownSignal::Terminate,
            }
        }
        Err(e) => {
            warn!("Failed to listen for SIGTERM: {}", e);
            interrupt().await;
            ShutdownSignal::Interrupt
        }
    }
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> ShutdownSignal {
    interrupt().await;
    ShutdownSignal::Interrupt
}

/// Drive `work` to completion unless `shutdown` fires first, and return the
/// process exit status. On shutdown `work` is dropped mid-flight.
pub async fn run_until_shutdown<W, S>(work: W, shutdown: S) -> u8
where
    W: Future<Output = Result<u8, BootstrapError>>,
    S: Future<Output = ShutdownSignal>,
{
    tokio::select! {
        result = work => match result {
            Ok(code) => code,
            Err(e) => e.exit_code(),
        },
        signal = shutdown => {
            warn!("🛑 Received {}; abandoning bootstrap", signal);
            signal.exit_code()
        }
    }
}
