//! CLI commands for the risk-gated autotrader.

pub mod approvals;
pub mod cycle;
pub mod halt;
pub mod report;
pub mod validate;

pub use approvals::{run_approvals, ApprovalsCommand};
pub use cycle::{run_cycle, CycleArgs};
pub use halt::{run_halt, HaltCommand};
pub use report::{run_report, ReportArgs};
pub use validate::{run_validate, ValidateArgs};

use anyhow::Result;
use autotrader_approvals::{ApprovalGate, ApprovalStore};
use autotrader_audit::AuditLedger;
use autotrader_core::AppConfig;
use autotrader_execution::HaltFlag;

/// Durable-state paths all hang off `data_dir`.
pub(crate) fn open_gate(config: &AppConfig) -> Result<ApprovalGate> {
    let store = ApprovalStore::new(config.data_dir.join("approvals.json"));
    Ok(ApprovalGate::open(store)?)
}

pub(crate) fn open_ledger(config: &AppConfig) -> AuditLedger {
    AuditLedger::new(config.data_dir.join("logs"))
}

pub(crate) fn open_halt_flag(config: &AppConfig) -> HaltFlag {
    HaltFlag::new(config.data_dir.join("halt.json"))
}
