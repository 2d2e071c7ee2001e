use autotrader_core::TradeRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from ledger appends and reads.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub message: String,
}

/// Append-only record of every trade execution and alert.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    dir: PathBuf,
}

impl AuditLedger {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn trades_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("trades-{}.jsonl", date.format("%Y-%m-%d")))
    }

    fn alerts_path(&self) -> PathBuf {
        self.dir.join("alerts.jsonl")
    }

    /// Appends one trade record to the stream for its calendar day.
    ///
    /// # Errors
    /// IO or serialization failure; the record is either fully written or
    /// not written at all.
    pub fn append_trade(&self, record: &TradeRecord) -> Result<(), LedgerError> {
        let path = self.trades_path(record.timestamp.date_naive());
        self.append_line(&path, record)?;
        debug!(symbol = %record.symbol, action = ?record.action, "Appended trade record");
        Ok(())
    }

    /// Appends one alert to the ongoing alert stream.
    ///
    /// # Errors
    /// IO or serialization failure.
    pub fn append_alert(&self, level: AlertLevel, message: &str) -> Result<(), LedgerError> {
        let record = AlertRecord {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
        };
        self.append_line(&self.alerts_path(), &record)?;
        debug!(%level, message, "Appended alert record");
        Ok(())
    }

    fn append_line<T: Serialize>(&self, path: &Path, record: &T) -> Result<(), LedgerError> {
        fs::create_dir_all(&self.dir)?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // One write call per record on an O_APPEND handle: concurrent
        // appenders cannot interleave within a line.
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Reads the trade stream for one calendar day, in append order.
    ///
    /// # Errors
    /// IO failure or a malformed line.
    pub fn read_trades(&self, date: NaiveDate) -> Result<Vec<TradeRecord>, LedgerError> {
        Self::read_lines(&self.trades_path(date))
    }

    /// Reads the full alert stream, in append order.
    ///
    /// # Errors
    /// IO failure or a malformed line.
    pub fn read_alerts(&self) -> Result<Vec<AlertRecord>, LedgerError> {
        Self::read_lines(&self.alerts_path())
    }

    fn read_lines<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, LedgerError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}
