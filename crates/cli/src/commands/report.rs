//! Daily activity report from the audit ledger.

use anyhow::Result;
use autotrader_core::ConfigLoader;
use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

/// Arguments for the report command.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Day to report on (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Also print the alert stream
    #[arg(long)]
    pub alerts: bool,
}

pub fn run_report(args: ReportArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)?;
    let ledger = super::open_ledger(&config);
    let date = args.date.unwrap_or_else(|| chrono::Utc::now().date_naive());

    let halt = super::open_halt_flag(&config).state()?;
    if halt.halted {
        println!(
            "trading HALTED since {}: {}",
            halt.changed_at,
            halt.reason.as_deref().unwrap_or("no reason recorded")
        );
    } else {
        println!("trading enabled");
    }
    let pending = super::open_gate(&config)?.list_pending()?;
    println!("pending approvals: {}", pending.len());

    let trades = ledger.read_trades(date)?;
    println!("trades on {date}: {}", trades.len());
    let mut net_notional = Decimal::ZERO;
    for trade in &trades {
        println!(
            "{}  {}  {}  {} @ {}  ({})",
            trade.timestamp, trade.action, trade.symbol, trade.size, trade.price, trade.reason
        );
        net_notional += trade.value;
    }
    if !trades.is_empty() {
        println!("total notional: {net_notional}");
    }

    if args.alerts {
        let alerts = ledger.read_alerts()?;
        println!("\nalerts: {}", alerts.len());
        for alert in &alerts {
            println!("{}  {}  {}", alert.timestamp, alert.level, alert.message);
        }
    }

    Ok(())
}
