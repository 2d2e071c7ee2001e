use crate::events::{TradeAction, TradeRecord};
use crate::limits::RiskLimits;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from portfolio bookkeeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortfolioError {
    /// A position for this symbol is already open.
    #[error("already holding {symbol}")]
    DuplicatePosition { symbol: String },

    /// No open position for this symbol.
    #[error("no open position for {symbol}")]
    NoSuchPosition { symbol: String },
}

/// One open position. At most one per symbol at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub size: Decimal,
    pub entry_price: Decimal,
    /// Unset until the first price tick arrives.
    pub current_price: Option<Decimal>,
    pub strategy: String,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

impl Position {
    /// Entry notional: `size * entry_price`.
    #[must_use]
    pub fn entry_notional(&self) -> Decimal {
        self.size * self.entry_price
    }

    /// Unrealized P&L, zero until a price tick has been seen.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        match self.current_price {
            Some(current) => (current - self.entry_price) * self.size,
            None => Decimal::ZERO,
        }
    }
}

/// Portfolio-wide health classification from unrealized P&L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskStatus {
    /// Loss at or past -20% of capital. Trading must halt.
    Critical,
    /// Loss at or past -10% of capital.
    Warning,
    /// Loss at or past -7% of capital.
    Caution,
    Ok,
}

impl std::fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::Warning => write!(f, "WARNING"),
            Self::Caution => write!(f, "CAUTION"),
            Self::Ok => write!(f, "OK"),
        }
    }
}

/// Point-in-time portfolio report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub capital: Decimal,
    pub portfolio_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub open_positions: usize,
    pub risk_status: RiskStatus,
}

/// Owns capital, open positions, and the append-only trade history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    capital: Decimal,
    positions: HashMap<String, Position>,
    trade_history: Vec<TradeRecord>,
}

impl Portfolio {
    #[must_use]
    pub fn new(capital: Decimal) -> Self {
        Self {
            capital,
            positions: HashMap::new(),
            trade_history: Vec::new(),
        }
    }

    #[must_use]
    pub fn capital(&self) -> Decimal {
        self.capital
    }

    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    #[must_use]
    pub fn holds(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    #[must_use]
    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    #[must_use]
    pub fn trade_history(&self) -> &[TradeRecord] {
        &self.trade_history
    }

    /// Opens a new position, deriving stop-loss and take-profit from the
    /// risk profile.
    ///
    /// # Errors
    /// `DuplicatePosition` if the symbol is already held.
    pub fn open_position(
        &mut self,
        symbol: &str,
        size: Decimal,
        entry_price: Decimal,
        strategy: &str,
        limits: &RiskLimits,
    ) -> Result<&Position, PortfolioError> {
        if self.positions.contains_key(symbol) {
            return Err(PortfolioError::DuplicatePosition {
                symbol: symbol.to_string(),
            });
        }

        let position = Position {
            symbol: symbol.to_string(),
            size,
            entry_price,
            current_price: None,
            strategy: strategy.to_string(),
            stop_loss: limits.stop_loss_price(entry_price),
            take_profit: limits.take_profit_price(entry_price),
        };

        tracing::info!(
            symbol,
            %size,
            %entry_price,
            strategy,
            "Opened position"
        );

        Ok(self.positions.entry(symbol.to_string()).or_insert(position))
    }

    /// Closes the position, realizing P&L into capital and appending a
    /// SELL record to the trade history.
    ///
    /// # Errors
    /// `NoSuchPosition` if the symbol is not held.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        reason: &str,
    ) -> Result<TradeRecord, PortfolioError> {
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| PortfolioError::NoSuchPosition {
                symbol: symbol.to_string(),
            })?;

        let realized = (exit_price - position.entry_price) * position.size;
        self.capital += realized;

        let record = TradeRecord::new(
            TradeAction::Sell,
            symbol,
            position.size,
            exit_price,
            position.strategy.clone(),
            reason,
        );
        self.trade_history.push(record.clone());

        tracing::info!(symbol, %realized, %exit_price, "Closed position");

        Ok(record)
    }

    /// Records a buy in the trade history.
    pub fn record_trade(&mut self, record: TradeRecord) {
        self.trade_history.push(record);
    }

    /// Updates the held position's mark price. No-op when the symbol is
    /// not held.
    pub fn update_price(&mut self, symbol: &str, price: Decimal) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.current_price = Some(price);
        }
    }

    /// Total unrealized P&L over all open positions.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    /// `capital + unrealized_pnl`.
    #[must_use]
    pub fn portfolio_value(&self) -> Decimal {
        self.capital + self.unrealized_pnl()
    }

    /// Combined open entry notional for one strategy.
    #[must_use]
    pub fn strategy_notional(&self, strategy: &str) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.strategy == strategy)
            .map(Position::entry_notional)
            .sum()
    }

    /// Classifies unrealized P&L as a percentage of capital. Thresholds are
    /// exact cut points, inclusive on the lower side: -20% is Critical,
    /// -10% is Warning, -7% is Caution.
    #[must_use]
    pub fn risk_status(&self) -> RiskStatus {
        if self.capital <= Decimal::ZERO {
            return RiskStatus::Critical;
        }

        let pnl_pct = self.unrealized_pnl() / self.capital * dec!(100);

        if pnl_pct <= dec!(-20) {
            RiskStatus::Critical
        } else if pnl_pct <= dec!(-10) {
            RiskStatus::Warning
        } else if pnl_pct <= dec!(-7) {
            RiskStatus::Caution
        } else {
            RiskStatus::Ok
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            timestamp: Utc::now(),
            capital: self.capital,
            portfolio_value: self.portfolio_value(),
            unrealized_pnl: self.unrealized_pnl(),
            open_positions: self.positions.len(),
            risk_status: self.risk_status(),
        }
    }
}
