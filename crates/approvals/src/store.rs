//! Durable JSON store for approval requests.
//!
//! The store is shared between a scheduled cycle and out-of-band operator
//! commands, so every write replaces the file atomically (temp file +
//! rename): a reader never observes a partial write. A missing file is an
//! empty store; a corrupt file is an error, because approval records are
//! audit data and must not be silently discarded.

use crate::gate::ApprovalRequest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors from the approval store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt approval store at {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exclusive advisory lock over the store file, held for the span of one
/// load-mutate-save transaction. Rename alone keeps reads consistent but
/// cannot stop two writers from saving each other's state away; the lock
/// serializes them across processes. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(error = %e, "Store lock release failed");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalStore {
    path: PathBuf,
}

impl ApprovalStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Takes the exclusive cross-process lock. Blocks until any concurrent
    /// holder (another cycle, an operator command) releases it.
    ///
    /// # Errors
    /// IO errors creating or locking the sibling lock file.
    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        let lock_path = self.path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(StoreLock { file })
    }

    /// Loads all requests in creation order.
    ///
    /// # Errors
    /// `Corrupt` when the file exists but cannot be parsed.
    pub fn load(&self) -> Result<Vec<ApprovalRequest>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Atomically replaces the store contents.
    pub fn save(&self, requests: &[ApprovalRequest]) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut tmp, requests)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(
            path = %self.path.display(),
            count = requests.len(),
            "Saved approval store"
        );

        Ok(())
    }
}
