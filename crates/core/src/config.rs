use crate::limits::RiskLimits;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for durable state: approval store, audit logs,
    /// halt flag.
    pub data_dir: PathBuf,

    /// Paper-trade mode: every validation approves with `simulation=true`
    /// and orders go to the paper connector.
    pub simulation: bool,

    /// Starting capital in USD.
    pub capital: Decimal,

    /// Timeout for connector and account calls, in seconds.
    pub connector_timeout_secs: u64,

    pub risk: RiskLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            simulation: true,
            capital: dec!(10000),
            connector_timeout_secs: 15,
            risk: RiskLimits::default(),
        }
    }
}
