//! Offline risk validation for a single trade candidate.
//!
//! Reads a JSON-encoded candidate, checks it against the configured limits
//! and a flat portfolio holding the configured capital, and emits the
//! decision as JSON. Useful for sanity-checking sizes and instruments
//! before wiring a signal source.

use anyhow::{Context, Result};
use autotrader_core::{validate_trade, ConfigLoader, Portfolio, TradeCandidate};
use clap::Args;
use rust_decimal::Decimal;
use std::io::Read;
use std::process::ExitCode;

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// JSON trade candidate file, "-" for stdin
    #[arg(long, default_value = "-")]
    pub input: String,

    /// Apply live risk rules even when the config enables simulation
    #[arg(long)]
    pub live: bool,
}

fn read_candidate(input: &str) -> Result<TradeCandidate> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading candidate from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("opening {input}"))?
    };
    serde_json::from_str(&raw).context("parsing trade candidate")
}

/// Validates a candidate and prints the decision as JSON. Exits with code 2
/// when the candidate is rejected.
pub fn run_validate(args: ValidateArgs) -> Result<ExitCode> {
    let config = ConfigLoader::load(&args.config)?;
    let portfolio = Portfolio::new(config.capital);
    let candidate = read_candidate(&args.input)?;

    let simulation = config.simulation && !args.live;
    let decision = validate_trade(
        &candidate,
        &portfolio,
        Decimal::ZERO,
        &config.risk,
        simulation,
    );

    println!("{}", serde_json::to_string_pretty(&decision)?);

    if decision.approved {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}
