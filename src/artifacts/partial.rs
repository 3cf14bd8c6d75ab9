//! Write-then-rename file guard.
//!
//! Bytes go to a hidden sibling file; only [`PartialFile::commit`] moves them
//! to the final path. Dropping an uncommitted guard (error, cancellation)
//! deletes the sibling, so the final path is either untouched or complete.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Suffix of in-flight download files.
pub const PARTIAL_SUFFIX: &str = ".partial";

pub struct PartialFile {
    file: Option<File>,
    temp_path: PathBuf,
    target: PathBuf,
    written: u64,
    committed: bool,
}

/// Hidden sibling path used while `target` is being written.
fn partial_path_for(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .with_context(|| format!("Target has no file name: {}", target.display()))?;

    Ok(target.with_file_name(format!(
        ".{}.{}{}",
        name.to_string_lossy(),
        Uuid::new_v4().simple(),
        PARTIAL_SUFFIX
    )))
}

impl PartialFile {
    /// Open a fresh temporary file next to `target`.
    pub async fn create(target: &Path) -> Result<Self> {
        let temp_path = partial_path_for(target)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;

        Ok(Self {
            file: Some(file),
            temp_path,
            target: target.to_path_buf(),
            written: 0,
            committed: false,
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub async fn write_all(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .context("Partial file already closed")?;
        file.write_all(chunk)
            .await
            .with_context(|| format!("Failed to write {}", self.temp_path.display()))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and atomically move into place. Returns bytes written.
    pub async fn commit(mut self) -> Result<u64> {
        let mut file = self.file.take().context("Partial file already closed")?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", self.temp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", self.temp_path.display()))?;
        drop(file);

        tokio::fs::rename(&self.temp_path, &self.target)
            .await
            .with_context(|| {
                format!(
                    "Failed to move {} into place at {}",
                    self.temp_path.display(),
                    self.target.display()
                )
            })?;

        self.committed = true;
        Ok(self.written)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        let _ = std::fs::remove_file(&self.temp_path);
    }
}
