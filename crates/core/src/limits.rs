use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Immutable risk-limit profile.
///
/// All percentage fields are fractions (0.05 = 5%). Defaults are the
/// conservative live profile: 5% per position, 20% per strategy, 7% stop,
/// 15% take-profit, 3% daily stop, manual approval above $500 notional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum single-position notional as a fraction of capital.
    pub max_position_pct: Decimal,

    /// Maximum combined open notional per strategy as a fraction of capital.
    pub max_strategy_pct: Decimal,

    /// Stop-loss distance below entry.
    pub stop_loss_pct: Decimal,

    /// Take-profit distance above entry.
    pub take_profit_pct: Decimal,

    /// Daily realized+unrealized loss, as a fraction of capital, that blocks
    /// all further trades.
    pub daily_loss_limit_pct: Decimal,

    /// Instruments the trader may touch at all.
    pub allowed_instruments: HashSet<String>,

    /// Notional (USD) above which a trade needs a recorded manual approval.
    pub approval_threshold_notional: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_pct: dec!(0.05),
            max_strategy_pct: dec!(0.20),
            stop_loss_pct: dec!(0.07),
            take_profit_pct: dec!(0.15),
            daily_loss_limit_pct: dec!(0.03),
            allowed_instruments: ["BTC-USD", "ETH-USD", "BTC-USDC", "ETH-USDC"]
                .into_iter()
                .map(String::from)
                .collect(),
            approval_threshold_notional: dec!(500),
        }
    }
}

impl RiskLimits {
    /// Builder method to set the per-position cap.
    #[must_use]
    pub fn with_max_position_pct(mut self, pct: Decimal) -> Self {
        self.max_position_pct = pct;
        self
    }

    /// Builder method to set the per-strategy cap.
    #[must_use]
    pub fn with_max_strategy_pct(mut self, pct: Decimal) -> Self {
        self.max_strategy_pct = pct;
        self
    }

    /// Builder method to set the daily loss limit.
    #[must_use]
    pub fn with_daily_loss_limit_pct(mut self, pct: Decimal) -> Self {
        self.daily_loss_limit_pct = pct;
        self
    }

    /// Builder method to set the manual-approval threshold.
    #[must_use]
    pub fn with_approval_threshold(mut self, notional: Decimal) -> Self {
        self.approval_threshold_notional = notional;
        self
    }

    /// Builder method to replace the allowed-instrument set.
    #[must_use]
    pub fn with_allowed_instruments<I, S>(mut self, instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_instruments = instruments.into_iter().map(Into::into).collect();
        self
    }

    /// Stop-loss price for a long entry: `entry * (1 - stop_loss_pct)`.
    #[must_use]
    pub fn stop_loss_price(&self, entry: Decimal) -> Decimal {
        entry * (Decimal::ONE - self.stop_loss_pct)
    }

    /// Take-profit price for a long entry: `entry * (1 + take_profit_pct)`.
    #[must_use]
    pub fn take_profit_price(&self, entry: Decimal) -> Decimal {
        entry * (Decimal::ONE + self.take_profit_pct)
    }

    #[must_use]
    pub fn is_allowed(&self, symbol: &str) -> bool {
        self.allowed_instruments.contains(symbol)
    }
}
