//! Artifact sync types.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// One object as reported by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Full key, including the prefix.
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub e_tag: Option<String>,
}

/// What happened to a single object during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Downloaded { bytes: u64 },
    /// Local copy already present; not re-downloaded.
    Skipped,
}

/// Per-object line of a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    /// Key relative to the sync prefix.
    pub key: String,
    pub local_path: PathBuf,
    pub status: TransferStatus,
}

/// Result of a completed sync
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub destination: PathBuf,
    /// Entries sorted by relative key.
    pub entries: Vec<SyncEntry>,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn downloaded_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, TransferStatus::Downloaded { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == TransferStatus::Skipped)
            .count()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.status {
                TransferStatus::Downloaded { bytes } => bytes,
                TransferStatus::Skipped => 0,
            })
            .sum()
    }
}
