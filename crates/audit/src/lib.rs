//! Append-only audit ledger.
//!
//! Trade records are partitioned into one JSONL stream per calendar day;
//! alerts accumulate in a single ongoing stream. The write path has no
//! update or delete: each append is one `write` of a single line on an
//! `O_APPEND` handle, so concurrent appenders never interleave partially.

pub mod ledger;

pub use ledger::{AlertLevel, AlertRecord, AuditLedger, LedgerError};
