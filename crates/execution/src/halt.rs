//! Durable trading halt flag.
//!
//! Once set (on a critical drawdown or by an operator), the flag survives
//! process restarts and is cleared only by an explicit external action,
//! never automatically on the next cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum HaltError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaltState {
    pub halted: bool,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl Default for HaltState {
    fn default() -> Self {
        Self {
            halted: false,
            reason: None,
            changed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HaltFlag {
    path: PathBuf,
}

impl HaltFlag {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Reads the persisted state. A missing file means not halted.
    ///
    /// # Errors
    /// IO or parse failure.
    pub fn state(&self) -> Result<HaltState, HaltError> {
        if !self.path.exists() {
            return Ok(HaltState::default());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// True when trading is halted.
    ///
    /// # Errors
    /// IO or parse failure.
    pub fn is_halted(&self) -> Result<bool, HaltError> {
        Ok(self.state()?.halted)
    }

    /// Durably sets the halt flag with a reason.
    ///
    /// # Errors
    /// IO failure while persisting.
    pub fn set(&self, reason: &str) -> Result<(), HaltError> {
        warn!(reason, "Setting trading halt");
        self.write(HaltState {
            halted: true,
            reason: Some(reason.to_string()),
            changed_at: Utc::now(),
        })
    }

    /// Explicit external reset.
    ///
    /// # Errors
    /// IO failure while persisting.
    pub fn clear(&self) -> Result<(), HaltError> {
        info!("Clearing trading halt");
        self.write(HaltState {
            halted: false,
            reason: None,
            changed_at: Utc::now(),
        })
    }

    fn write(&self, state: HaltState) -> Result<(), HaltError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, &state)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
