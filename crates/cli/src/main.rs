use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod commands;

use commands::{ApprovalsCommand, CycleArgs, HaltCommand, ReportArgs, ValidateArgs};

#[derive(Parser)]
#[command(name = "autotrader")]
#[command(about = "Risk-gated autonomous trading executor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one trade candidate against the risk rules
    Validate(ValidateArgs),
    /// Run one execution cycle over a batch of signals
    Cycle(CycleArgs),
    /// Inspect and resolve approval requests
    Approvals {
        #[command(subcommand)]
        command: ApprovalsCommand,
    },
    /// Inspect and operate the trading halt
    Halt {
        #[command(subcommand)]
        command: HaltCommand,
    },
    /// Print the day's trades and alerts from the audit ledger
    Report(ReportArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let code = match cli.command {
        Commands::Validate(args) => commands::run_validate(args)?,
        Commands::Cycle(args) => commands::run_cycle(args).await?,
        Commands::Approvals { command } => {
            commands::run_approvals(command)?;
            ExitCode::SUCCESS
        }
        Commands::Halt { command } => {
            commands::run_halt(command)?;
            ExitCode::SUCCESS
        }
        Commands::Report(args) => {
            commands::run_report(args)?;
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
