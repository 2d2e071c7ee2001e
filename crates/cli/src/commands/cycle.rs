//! One execution cycle over a batch of signals.
//!
//! Signals are read from a JSON file and run through the orchestrator with
//! the paper connector. The durable state under `data_dir` (approval store,
//! audit logs, halt flag) is shared with the other commands, so a trade
//! deferred here can be approved with `autotrader approvals approve` and
//! executed on the next invocation.

use anyhow::{Context, Result};
use autotrader_core::{ConfigLoader, Signal};
use autotrader_execution::{
    CycleError, ExecutionOrchestrator, OrchestratorConfig, PaperConnector,
};
use clap::Args;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

/// Arguments for the cycle command.
#[derive(Args, Debug)]
pub struct CycleArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// JSON file holding the batch of signals to process
    #[arg(long)]
    pub signals: PathBuf,
}

fn read_signals(path: &PathBuf) -> Result<Vec<Signal>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let signals = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(signals)
}

/// Runs one cycle. Exit codes: 0 for a clean cycle, 1 when trading is
/// halted, 2 when at least one signal was rejected by the risk rules.
pub async fn run_cycle(args: CycleArgs) -> Result<ExitCode> {
    let config = ConfigLoader::load(&args.config)?;
    let signals = read_signals(&args.signals)?;

    let gate = super::open_gate(&config)?;
    let ledger = super::open_ledger(&config);
    let halt = super::open_halt_flag(&config);

    let orchestrator_config = OrchestratorConfig::new(config.simulation, config.capital, config.risk)
        .with_connector_timeout(Duration::from_secs(config.connector_timeout_secs));
    let connector = PaperConnector::new(config.capital);
    let mut orchestrator =
        ExecutionOrchestrator::new(orchestrator_config, connector, gate, ledger, halt);

    match orchestrator.run_cycle(signals).await {
        Ok(report) => {
            info!(
                executed = report.executed,
                rejected = report.rejected,
                deferred = report.deferred,
                failed = report.failed,
                "Cycle finished"
            );
            println!(
                "executed: {}  rejected: {}  deferred: {}  failed: {}",
                report.executed, report.rejected, report.deferred, report.failed
            );
            if report.rejected > 0 {
                Ok(ExitCode::from(2))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(CycleError::Halted { reason }) => {
            error!(%reason, "Trading is halted");
            println!("trading halted: {reason}");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}
