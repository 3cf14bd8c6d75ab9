//! Remote-to-local model synchronization.
//!
//! 1. List every object under the prefix
//! 2. Map each key onto `destination/<relative key>`
//! 3. Fail fast if a required key is not in the listing
//! 4. Download missing objects (bounded concurrency, write-then-rename),
//!    skipping ones already on disk when `skip_existing` is set
//! 5. Check that every required key now exists locally
//!
//! The first failed transfer cancels the rest.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::{stream, StreamExt, TryStreamExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::partial::PartialFile;
use super::store::ArtifactStore;
use super::types::{ObjectRecord, SyncEntry, SyncReport, TransferStatus};
use crate::config::SyncSpec;
use crate::error::SyncError;

/// A listed object together with where it goes.
#[derive(Debug, Clone)]
struct PlannedObject {
    record: ObjectRecord,
    relative: String,
    target: PathBuf,
}

/// Join `relative` onto `destination`, refusing anything that could escape it.
pub fn local_path_for(destination: &Path, relative: &str) -> Option<PathBuf> {
    let relative_path = Path::new(relative);
    let mut components = relative_path.components().peekable();
    components.peek()?;

    if components.all(|c| matches!(c, Component::Normal(_))) {
        Some(destination.join(relative_path))
    } else {
        None
    }
}

/// Every `/`-separated ancestor of the listed keys.
fn directories_of(records: &[ObjectRecord]) -> HashSet<&str> {
    records
        .iter()
        .flat_map(|record| {
            record
                .key
                .match_indices('/')
                .map(move |(i, _)| &record.key[..i])
        })
        .collect()
}

/// Folder placeholders created by S3 consoles. Some clients return them as
/// `dir/`; `object_store` strips the slash and returns `dir`.
fn is_folder_marker(record: &ObjectRecord, prefix: &str, directories: &HashSet<&str>) -> bool {
    if record.key.ends_with('/') {
        return true;
    }
    let prefix_dir = prefix.trim_end_matches('/');
    if !prefix_dir.is_empty() && record.key == prefix_dir {
        return true;
    }
    record.size == 0 && directories.contains(record.key.as_str())
}

/// Turn the raw listing into download targets.
fn plan(spec: &SyncSpec, records: Vec<ObjectRecord>) -> Result<Vec<PlannedObject>, SyncError> {
    let markers: HashSet<String> = {
        let directories = directories_of(&records);
        records
            .iter()
            .filter(|record| is_folder_marker(record, &spec.prefix, &directories))
            .map(|record| record.key.clone())
            .collect()
    };
    let mut planned = Vec::with_capacity(records.len());

    for record in records {
        if markers.contains(&record.key) {
            debug!("Skipping folder marker {}", record.key);
            continue;
        }

        let relative = record
            .key
            .strip_prefix(spec.prefix.as_str())
            .ok_or_else(|| SyncError::InvalidKey(record.key.clone()))?
            .trim_start_matches('/')
            .to_string();

        if relative.is_empty() {
            continue;
        }

        let target = local_path_for(&spec.destination, &relative)
            .ok_or_else(|| SyncError::InvalidKey(record.key.clone()))?;

        planned.push(PlannedObject {
            record,
            relative,
            target,
        });
    }

    planned.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(planned)
}

async fn download(store: &dyn ArtifactStore, key: &str, target: &Path) -> Result<u64> {
    let parent = target
        .parent()
        .with_context(|| format!("Target has no parent directory: {}", target.display()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let mut body = store.fetch(key).await?;
    let mut partial = PartialFile::create(target).await?;
    debug!("Writing {} via {}", key, partial.temp_path().display());

    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("Failed while streaming {}", key))?;
        partial.write_all(&chunk).await?;
    }

    partial.commit().await
}

async fn transfer(
    store: &dyn ArtifactStore,
    skip_existing: bool,
    object: PlannedObject,
) -> Result<SyncEntry, SyncError> {
    if skip_existing && tokio::fs::try_exists(&object.target).await.unwrap_or(false) {
        debug!("Skipping {} (already present)", object.relative);
        return Ok(SyncEntry {
            key: object.relative,
            local_path: object.target,
            status: TransferStatus::Skipped,
        });
    }

    info!(
        "⬇️  Downloading {} ({} bytes) -> {}",
        object.record.key,
        object.record.size,
        object.target.display()
    );
    debug!(
        "   etag {:?}, last modified {:?}",
        object.record.e_tag, object.record.last_modified
    );

    let bytes = download(store, &object.record.key, &object.target)
        .await
        .map_err(|cause| SyncError::Transfer {
            key: object.record.key.clone(),
            cause,
        })?;

    Ok(SyncEntry {
        key: object.relative,
        local_path: object.target,
        status: TransferStatus::Downloaded { bytes },
    })
}

/// Make sure every object under `spec.prefix` exists under `spec.destination`.
pub async fn sync(store: &dyn ArtifactStore, spec: &SyncSpec) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    info!(
        "☁️  Syncing {} -> {} (skip existing: {})",
        spec.source_uri(),
        spec.destination.display(),
        spec.skip_existing
    );

    tokio::fs::create_dir_all(&spec.destination)
        .await
        .map_err(|e| SyncError::Destination {
            path: spec.destination.clone(),
            cause: e.into(),
        })?;

    let records = store
        .list(&spec.prefix)
        .await
        .map_err(SyncError::Listing)?;
    let planned = plan(spec, records)?;

    if planned.is_empty() {
        warn!(
            "⚠️  No objects found under {} on {}",
            spec.source_uri(),
            store.describe()
        );
    } else {
        info!("   {} object(s) listed", planned.len());
    }

    let listed: HashSet<&str> = planned.iter().map(|p| p.relative.as_str()).collect();
    for key in &spec.required_keys {
        if local_path_for(&spec.destination, key).is_none() {
            return Err(SyncError::InvalidKey(key.clone()));
        }
        if !listed.contains(key.as_str()) {
            error!("❌ Required artifact {} is not in the remote listing", key);
            return Err(SyncError::MissingRequiredArtifact(key.clone()));
        }
    }

    let mut entries: Vec<SyncEntry> = stream::iter(planned)
        .map(|object| transfer(store, spec.skip_existing, object))
        .buffer_unordered(spec.concurrency.max(1))
        .try_collect()
        .await
        .map_err(|e| {
            error!("❌ {}", e);
            e
        })?;
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    for key in &spec.required_keys {
        let present = match local_path_for(&spec.destination, key) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        };
        if !present {
            error!("❌ Required artifact {} is missing after sync", key);
            return Err(SyncError::MissingRequiredArtifact(key.clone()));
        }
    }

    let report = SyncReport {
        destination: spec.destination.clone(),
        entries,
        elapsed: started.elapsed(),
    };

    info!(
        "✅ Model sync complete: {} downloaded ({} bytes), {} skipped in {:?}",
        report.downloaded_count(),
        report.bytes_downloaded(),
        report.skipped_count(),
        report.elapsed
    );

    Ok(report)
}
