//! Stateless trade validation and position sizing.
//!
//! Every order passes through [`validate_trade`] before it may reach a
//! connector. The evaluator holds no state of its own: it reads the
//! portfolio snapshot and the configured [`RiskLimits`] and produces a
//! [`Decision`] with a human-readable reason.

use crate::events::Side;
use crate::limits::RiskLimits;
use crate::portfolio::{Portfolio, RiskStatus};
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A trade candidate as submitted for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCandidate {
    pub symbol: String,
    pub side: Side,
    /// Notional in USD.
    pub size_usd: Decimal,
    #[serde(default)]
    pub strategy: String,
}

/// Outcome of risk validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub approved: bool,
    pub reason: String,
    pub warnings: Vec<String>,
    pub requires_manual_approval: bool,
    pub simulation: bool,
}

impl Decision {
    fn rejected(reason: String) -> Self {
        Self {
            approved: false,
            reason,
            warnings: Vec::new(),
            requires_manual_approval: false,
            simulation: false,
        }
    }
}

/// Safe position size in units of the asset:
/// `capital * max_position_pct / price`.
///
/// # Errors
/// Returns an error when price or capital is not positive.
pub fn position_size(capital: Decimal, price: Decimal, limits: &RiskLimits) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        anyhow::bail!("price must be positive");
    }
    if capital <= Decimal::ZERO {
        anyhow::bail!("capital must be positive");
    }
    Ok(capital * limits.max_position_pct / price)
}

fn as_pct(fraction: Decimal) -> Decimal {
    (fraction * dec!(100)).round_dp(2)
}

/// Validates a trade candidate against the risk rules.
///
/// `daily_realized_pnl` is today's realized P&L; the unrealized component is
/// read from the portfolio. The daily-loss gate checks the state *before*
/// this trade, so a pre-existing breach blocks all further trades.
#[must_use]
pub fn validate_trade(
    trade: &TradeCandidate,
    portfolio: &Portfolio,
    daily_realized_pnl: Decimal,
    limits: &RiskLimits,
    simulation: bool,
) -> Decision {
    if simulation {
        return Decision {
            approved: true,
            reason: "Simulation mode: paper trade only".to_string(),
            warnings: Vec::new(),
            requires_manual_approval: false,
            simulation: true,
        };
    }

    if !limits.is_allowed(&trade.symbol) {
        return Decision::rejected(format!(
            "Rejected: {} is not an allowed instrument",
            trade.symbol
        ));
    }

    if trade.side == Side::Buy && portfolio.holds(&trade.symbol) {
        return Decision::rejected(format!("Rejected: already holding {}", trade.symbol));
    }

    let portfolio_value = portfolio.portfolio_value();
    if portfolio_value <= Decimal::ZERO {
        return Decision::rejected("Rejected: portfolio value is not positive".to_string());
    }

    let position_pct = trade.size_usd / portfolio_value;
    if position_pct > limits.max_position_pct {
        return Decision::rejected(format!(
            "Rejected: position {}% exceeds max {}%",
            as_pct(position_pct),
            as_pct(limits.max_position_pct)
        ));
    }

    let mut warnings = Vec::new();
    if position_pct > limits.max_position_pct * dec!(0.5) {
        warnings.push(format!(
            "Large position: {}% of portfolio",
            as_pct(position_pct)
        ));
    }

    if portfolio.risk_status() == RiskStatus::Critical {
        return Decision::rejected("Rejected: critical drawdown, trading halted".to_string());
    }

    let capital = portfolio.capital();
    let daily_pnl = daily_realized_pnl + portfolio.unrealized_pnl();
    if daily_pnl <= -(limits.daily_loss_limit_pct * capital) {
        return Decision::rejected(format!(
            "Rejected: daily loss limit reached ({}%)",
            as_pct(daily_pnl / capital)
        ));
    }

    if trade.side == Side::Buy {
        let strategy_notional = portfolio.strategy_notional(&trade.strategy) + trade.size_usd;
        if strategy_notional > limits.max_strategy_pct * capital {
            return Decision::rejected(format!(
                "Rejected: strategy {} at max allocation",
                trade.strategy
            ));
        }
    }

    let requires_manual_approval = trade.size_usd > limits.approval_threshold_notional;

    Decision {
        approved: true,
        reason: if warnings.is_empty() {
            "Approved".to_string()
        } else {
            "Approved with warnings".to_string()
        },
        warnings,
        requires_manual_approval,
        simulation: false,
    }
}
