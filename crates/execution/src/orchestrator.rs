//! Execution cycle orchestration.
//!
//! A cycle takes a batch of signals, validates each against the risk rules,
//! routes oversized trades through the approval gate, and places the
//! survivors on the connector. Every terminal outcome is written to the
//! audit ledger. One bad signal never sinks the rest of the batch.

use autotrader_approvals::{
    ActionType, ApprovalError, ApprovalGate, ApprovalOutcome, ApprovalRequest, ApprovalStatus,
};
use autotrader_audit::{AlertLevel, AuditLedger, LedgerError};
use autotrader_core::risk::{validate_trade, Decision, TradeCandidate};
use autotrader_core::{
    ExchangeConnector, OrderRequest, OrderStatus, Portfolio, RiskLimits, RiskStatus, Side, Signal,
    StopLossRequest, TradeAction, TradeRecord,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::halt::{HaltError, HaltFlag};
use crate::registry::StrategyRegistry;

/// Consecutive connector failures that trigger an escalation alert.
const CONNECTOR_FAILURE_ESCALATION: u32 = 3;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("trading halted: {reason}")]
    Halted { reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Halt(#[from] HaltError),
}

/// Counts of terminal signal outcomes for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub executed: usize,
    pub rejected: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl CycleReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.executed + self.rejected + self.deferred + self.failed
    }
}

enum Disposition {
    Executed,
    Rejected,
    Deferred,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub simulation: bool,
    pub capital: Decimal,
    pub limits: RiskLimits,
    pub connector_timeout: Duration,
}

impl OrchestratorConfig {
    #[must_use]
    pub fn new(simulation: bool, capital: Decimal, limits: RiskLimits) -> Self {
        Self {
            simulation,
            capital,
            limits,
            connector_timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn with_connector_timeout(mut self, timeout: Duration) -> Self {
        self.connector_timeout = timeout;
        self
    }
}

pub struct ExecutionOrchestrator<C: ExchangeConnector> {
    portfolio: Portfolio,
    limits: RiskLimits,
    simulation: bool,
    connector: C,
    gate: ApprovalGate,
    ledger: AuditLedger,
    halt: HaltFlag,
    connector_timeout: Duration,
    daily_realized_pnl: Decimal,
    /// Signal key ("strategy:side:symbol") to approval request id, for
    /// signals deferred in an earlier cycle.
    pending_requests: HashMap<String, String>,
    consecutive_connector_failures: u32,
}

impl<C: ExchangeConnector> ExecutionOrchestrator<C> {
    pub fn new(
        config: OrchestratorConfig,
        connector: C,
        gate: ApprovalGate,
        ledger: AuditLedger,
        halt: HaltFlag,
    ) -> Self {
        Self {
            portfolio: Portfolio::new(config.capital),
            limits: config.limits,
            simulation: config.simulation,
            connector,
            gate,
            ledger,
            halt,
            connector_timeout: config.connector_timeout,
            daily_realized_pnl: Decimal::ZERO,
            pending_requests: HashMap::new(),
            consecutive_connector_failures: 0,
        }
    }

    #[must_use]
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    #[must_use]
    pub fn daily_realized_pnl(&self) -> Decimal {
        self.daily_realized_pnl
    }

    /// Updates the mark price of a held position.
    pub fn mark_price(&mut self, symbol: &str, price: Decimal) {
        self.portfolio.update_price(symbol, price);
    }

    /// Collects signals from every registered strategy. A failing strategy
    /// is alerted and skipped; the others still contribute.
    pub async fn gather_signals(&mut self, registry: &StrategyRegistry) -> Vec<Signal> {
        let mut signals = Vec::new();
        for (name, strategy) in registry.iter() {
            let mut strategy = strategy.lock().await;
            match strategy.generate_signals(&self.portfolio, &self.limits).await {
                Ok(generated) => {
                    info!(strategy = %name, count = generated.len(), "Strategy signals collected");
                    signals.extend(generated);
                }
                Err(err) => {
                    error!(strategy = %name, error = %err, "Strategy failed to generate signals");
                    self.alert_best_effort(
                        AlertLevel::Error,
                        &format!("Strategy {name} failed to generate signals: {err}"),
                    );
                }
            }
        }
        signals
    }

    /// Gathers signals from the registry, then runs one cycle over them.
    ///
    /// # Errors
    /// Same conditions as [`run_cycle`](Self::run_cycle).
    pub async fn run_cycle_with_strategies(
        &mut self,
        registry: &StrategyRegistry,
    ) -> Result<CycleReport, CycleError> {
        let signals = self.gather_signals(registry).await;
        self.run_cycle(signals).await
    }

    /// Runs one execution cycle over a batch of signals.
    ///
    /// # Errors
    /// `Halted` when the durable halt flag is set or the portfolio is in
    /// critical drawdown; ledger and halt-flag I/O errors otherwise.
    pub async fn run_cycle(&mut self, signals: Vec<Signal>) -> Result<CycleReport, CycleError> {
        let halt_state = self.halt.state()?;
        if halt_state.halted {
            let reason = halt_state
                .reason
                .unwrap_or_else(|| "no reason recorded".to_string());
            warn!(%reason, "Trading halted; skipping cycle");
            self.ledger.append_alert(
                AlertLevel::Warning,
                &format!("Cycle skipped: trading halted ({reason})"),
            )?;
            return Err(CycleError::Halted { reason });
        }

        if self.portfolio.risk_status() == RiskStatus::Critical {
            let reason = "critical drawdown".to_string();
            self.halt.set(&reason)?;
            error!("Critical drawdown reached; halting trading");
            self.ledger.append_alert(
                AlertLevel::Critical,
                "Critical drawdown reached; trading halted until flag is cleared",
            )?;
            return Err(CycleError::Halted { reason });
        }

        let mut report = CycleReport::default();
        for signal in signals {
            match self.process_signal(&signal).await? {
                Disposition::Executed => report.executed += 1,
                Disposition::Rejected => report.rejected += 1,
                Disposition::Deferred => report.deferred += 1,
                Disposition::Failed => report.failed += 1,
            }
        }

        info!(
            executed = report.executed,
            rejected = report.rejected,
            deferred = report.deferred,
            failed = report.failed,
            "Cycle complete"
        );

        Ok(report)
    }

    async fn process_signal(&mut self, signal: &Signal) -> Result<Disposition, CycleError> {
        if signal.side == Side::Sell && !self.portfolio.holds(&signal.symbol) {
            self.ledger.append_alert(
                AlertLevel::Info,
                &format!("Sell signal for {} ignored: no open position", signal.symbol),
            )?;
            return Ok(Disposition::Rejected);
        }

        // Sells unwind the whole held position; buys default to the
        // per-position cap when the signal does not size itself.
        let size_usd = match signal.side {
            Side::Sell => self
                .portfolio
                .position(&signal.symbol)
                .map(|p| p.size * signal.price),
            Side::Buy => signal.size_usd,
        }
        .unwrap_or(self.portfolio.capital() * self.limits.max_position_pct);

        let candidate = TradeCandidate {
            symbol: signal.symbol.clone(),
            side: signal.side,
            size_usd,
            strategy: signal.strategy.clone(),
        };
        let decision = validate_trade(
            &candidate,
            &self.portfolio,
            self.daily_realized_pnl,
            &self.limits,
            self.simulation,
        );

        for warning in &decision.warnings {
            warn!(symbol = %signal.symbol, %warning, "Risk warning");
            self.ledger.append_alert(
                AlertLevel::Warning,
                &format!("{} ({})", warning, signal.symbol),
            )?;
        }

        if !decision.approved {
            warn!(symbol = %signal.symbol, reason = %decision.reason, "Trade rejected");
            self.ledger.append_alert(
                AlertLevel::Info,
                &format!("{} ({})", decision.reason, signal.symbol),
            )?;
            return Ok(Disposition::Rejected);
        }

        if decision.requires_manual_approval {
            if let Some(disposition) = self.resolve_manual_approval(signal, size_usd)? {
                return Ok(disposition);
            }
        }

        self.execute(signal, size_usd, &decision).await
    }

    /// Finds the request governing a signal: the cached id when this process
    /// filed it, otherwise the most recent stored request carrying the same
    /// signal key. The store scan lets a deferred trade resolve across
    /// restarts.
    fn lookup_request(&self, key: &str) -> Result<Option<ApprovalRequest>, ApprovalError> {
        if let Some(request_id) = self.pending_requests.get(key) {
            if let Some(request) = self.gate.get(request_id)? {
                return Ok(Some(request));
            }
        }
        Ok(self
            .gate
            .list()?
            .into_iter()
            .rev()
            .find(|r| r.details.get("signal_key").and_then(Value::as_str) == Some(key)))
    }

    /// Checks the approval gate for an oversized trade. Returns `None` when
    /// the trade is cleared to execute, otherwise the terminal disposition.
    fn resolve_manual_approval(
        &mut self,
        signal: &Signal,
        size_usd: Decimal,
    ) -> Result<Option<Disposition>, CycleError> {
        let key = signal_key(signal, size_usd);

        let existing = match self.lookup_request(&key) {
            Ok(existing) => existing,
            Err(err) => {
                error!(signal_key = %key, error = %err, "Approval lookup failed");
                self.ledger.append_alert(
                    AlertLevel::Error,
                    &format!("Approval lookup failed for {}: {err}", signal.symbol),
                )?;
                return Ok(Some(Disposition::Failed));
            }
        };

        if let Some(request) = existing {
            let request_id = request.id;
            match request.status {
                ApprovalStatus::Approved => {
                    self.pending_requests.remove(&key);
                    info!(%request_id, symbol = %signal.symbol, "Manual approval granted");
                    return Ok(None);
                }
                ApprovalStatus::Rejected => {
                    self.pending_requests.remove(&key);
                    self.ledger.append_alert(
                        AlertLevel::Warning,
                        &format!(
                            "Trade for {} rejected by manual review (request {request_id})",
                            signal.symbol
                        ),
                    )?;
                    return Ok(Some(Disposition::Rejected));
                }
                ApprovalStatus::Pending => {
                    info!(%request_id, symbol = %signal.symbol, "Still awaiting manual approval");
                    self.ledger.append_alert(
                        AlertLevel::Info,
                        &format!(
                            "Trade for {} still awaiting manual approval (request {request_id})",
                            signal.symbol
                        ),
                    )?;
                    self.pending_requests.insert(key, request_id);
                    return Ok(Some(Disposition::Deferred));
                }
            }
        }

        let details = json!({
            "signal_key": key,
            "symbol": signal.symbol,
            "side": signal.side,
            "size_usd": size_usd,
            "price": signal.price,
            "strategy": signal.strategy,
        });
        match self.gate.request_approval(ActionType::TradeExecute, details) {
            Ok(ApprovalOutcome::Approved { reason }) => {
                info!(symbol = %signal.symbol, %reason, "Trade cleared without manual review");
                Ok(None)
            }
            Ok(ApprovalOutcome::Pending { request_id }) => {
                self.ledger.append_alert(
                    AlertLevel::Info,
                    &format!(
                        "Trade for {} (${size_usd}) awaiting manual approval (request {request_id})",
                        signal.symbol
                    ),
                )?;
                self.pending_requests.insert(key, request_id);
                Ok(Some(Disposition::Deferred))
            }
            Err(err) => {
                error!(symbol = %signal.symbol, error = %err, "Approval request failed");
                self.ledger.append_alert(
                    AlertLevel::Error,
                    &format!("Approval request failed for {}: {err}", signal.symbol),
                )?;
                Ok(Some(Disposition::Failed))
            }
        }
    }

    async fn execute(
        &mut self,
        signal: &Signal,
        size_usd: Decimal,
        decision: &Decision,
    ) -> Result<Disposition, CycleError> {
        if signal.price <= Decimal::ZERO {
            self.ledger.append_alert(
                AlertLevel::Error,
                &format!("Signal for {} carries a non-positive price", signal.symbol),
            )?;
            return Ok(Disposition::Failed);
        }
        let size = size_usd / signal.price;

        let order = OrderRequest {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            size,
            price: signal.price,
        };

        let placed = timeout(self.connector_timeout, self.connector.place_limit_order(order)).await;
        let result = match placed {
            Ok(Ok(result)) if result.status != OrderStatus::Rejected => result,
            Ok(Ok(result)) => {
                return self
                    .connector_failure(signal, &format!("order {} rejected by venue", result.order_id))
                    .map(|()| Disposition::Failed);
            }
            Ok(Err(err)) => {
                return self
                    .connector_failure(signal, &err.to_string())
                    .map(|()| Disposition::Failed);
            }
            Err(_) => {
                return self
                    .connector_failure(signal, "order timed out")
                    .map(|()| Disposition::Failed);
            }
        };
        self.consecutive_connector_failures = 0;

        match signal.side {
            Side::Buy => {
                if let Err(err) = self.portfolio.open_position(
                    &signal.symbol,
                    size,
                    signal.price,
                    &signal.strategy,
                    &self.limits,
                ) {
                    error!(symbol = %signal.symbol, error = %err, "Fill could not be booked");
                    self.ledger.append_alert(
                        AlertLevel::Error,
                        &format!("Fill for {} could not be booked: {err}", signal.symbol),
                    )?;
                    return Ok(Disposition::Failed);
                }

                let record = TradeRecord::new(
                    TradeAction::Buy,
                    &signal.symbol,
                    size,
                    signal.price,
                    &signal.strategy,
                    &decision.reason,
                );
                self.portfolio.record_trade(record.clone());
                self.ledger.append_trade(&record)?;

                self.place_stop_loss_best_effort(signal, size).await?;

                info!(
                    symbol = %signal.symbol,
                    %size,
                    price = %signal.price,
                    order_id = %result.order_id,
                    "Buy executed"
                );
            }
            Side::Sell => {
                let entry_price = self
                    .portfolio
                    .position(&signal.symbol)
                    .map(|p| p.entry_price)
                    .unwrap_or(signal.price);
                let record = match self.portfolio.close_position(
                    &signal.symbol,
                    signal.price,
                    &decision.reason,
                ) {
                    Ok(record) => record,
                    Err(err) => {
                        error!(symbol = %signal.symbol, error = %err, "Close could not be booked");
                        self.ledger.append_alert(
                            AlertLevel::Error,
                            &format!("Close for {} could not be booked: {err}", signal.symbol),
                        )?;
                        return Ok(Disposition::Failed);
                    }
                };

                let realized = (signal.price - entry_price) * record.size;
                self.daily_realized_pnl += realized;
                self.ledger.append_trade(&record)?;

                info!(
                    symbol = %signal.symbol,
                    %realized,
                    exit_price = %signal.price,
                    order_id = %result.order_id,
                    "Sell executed"
                );
            }
        }

        Ok(Disposition::Executed)
    }

    /// Places the protective stop for a fresh fill. A failed stop placement
    /// is a warning, not a failed trade; the position stands either way.
    async fn place_stop_loss_best_effort(
        &mut self,
        signal: &Signal,
        size: Decimal,
    ) -> Result<(), CycleError> {
        let stop = StopLossRequest {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: signal.symbol.clone(),
            side: Side::Sell,
            size,
            stop_price: self.limits.stop_loss_price(signal.price),
        };
        let stop_price = stop.stop_price;

        match timeout(self.connector_timeout, self.connector.place_stop_loss(stop)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(symbol = %signal.symbol, error = %err, "Stop-loss placement failed");
                self.ledger.append_alert(
                    AlertLevel::Warning,
                    &format!(
                        "Stop-loss for {} at {stop_price} not placed: {err}",
                        signal.symbol
                    ),
                )?;
            }
            Err(_) => {
                warn!(symbol = %signal.symbol, "Stop-loss placement timed out");
                self.ledger.append_alert(
                    AlertLevel::Warning,
                    &format!(
                        "Stop-loss for {} at {stop_price} not placed: timed out",
                        signal.symbol
                    ),
                )?;
            }
        }
        Ok(())
    }

    fn connector_failure(&mut self, signal: &Signal, detail: &str) -> Result<(), CycleError> {
        self.consecutive_connector_failures += 1;
        error!(
            symbol = %signal.symbol,
            failures = self.consecutive_connector_failures,
            %detail,
            "Connector failure"
        );
        self.ledger.append_alert(
            AlertLevel::Error,
            &format!("Order for {} failed: {detail}", signal.symbol),
        )?;

        if self.consecutive_connector_failures >= CONNECTOR_FAILURE_ESCALATION {
            self.ledger.append_alert(
                AlertLevel::Critical,
                &format!(
                    "{} consecutive connector failures",
                    self.consecutive_connector_failures
                ),
            )?;
        }
        Ok(())
    }

    fn alert_best_effort(&self, level: AlertLevel, message: &str) {
        if let Err(err) = self.ledger.append_alert(level, message) {
            error!(error = %err, "Alert could not be written");
        }
    }
}

// The notional is part of the key: an operator decision covers one trade
// size, and a resized signal must file a fresh request.
fn signal_key(signal: &Signal, size_usd: Decimal) -> String {
    format!(
        "{}:{}:{}:{}",
        signal.strategy,
        signal.side,
        signal.symbol,
        size_usd.normalize()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperConnector;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use autotrader_approvals::ApprovalStore;
    use autotrader_core::{AccountInfo, OrderResult, Strategy};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        gate_store_path: std::path::PathBuf,
    }

    fn setup() -> (Harness, ApprovalGate, AuditLedger, HaltFlag) {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("approvals.json");
        let gate = ApprovalGate::open(ApprovalStore::new(store_path.clone())).unwrap();
        let ledger = AuditLedger::new(dir.path().join("logs"));
        let halt = HaltFlag::new(dir.path().join("halt.json"));
        (
            Harness {
                _dir: dir,
                gate_store_path: store_path,
            },
            gate,
            ledger,
            halt,
        )
    }

    fn orchestrator(
        simulation: bool,
        gate: ApprovalGate,
        ledger: AuditLedger,
        halt: HaltFlag,
    ) -> ExecutionOrchestrator<PaperConnector> {
        orchestrator_with_capital(simulation, dec!(10000), gate, ledger, halt)
    }

    fn orchestrator_with_capital(
        simulation: bool,
        capital: Decimal,
        gate: ApprovalGate,
        ledger: AuditLedger,
        halt: HaltFlag,
    ) -> ExecutionOrchestrator<PaperConnector> {
        ExecutionOrchestrator::new(
            OrchestratorConfig::new(simulation, capital, RiskLimits::default()),
            PaperConnector::new(capital),
            gate,
            ledger,
            halt,
        )
    }

    fn buy(symbol: &str, price: Decimal, size_usd: Decimal) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            side: Side::Buy,
            price,
            size_usd: Some(size_usd),
            strategy: "momentum".to_string(),
        }
    }

    fn sell(symbol: &str, price: Decimal) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            side: Side::Sell,
            price,
            size_usd: None,
            strategy: "momentum".to_string(),
        }
    }

    #[tokio::test]
    async fn simulation_buy_executes_and_books_position() {
        let (_h, gate, ledger, halt) = setup();
        let mut orch = orchestrator(true, gate, ledger, halt);

        let report = orch
            .run_cycle(vec![buy("BTC-USD", dec!(50000), dec!(400))])
            .await
            .unwrap();

        assert_eq!(report.executed, 1);
        assert!(orch.portfolio().holds("BTC-USD"));
        assert_eq!(orch.portfolio().position("BTC-USD").unwrap().size, dec!(400) / dec!(50000));
    }

    #[tokio::test]
    async fn executed_buy_is_audited() {
        let (_h, gate, ledger, halt) = setup();
        let reader = AuditLedger::new(ledger.dir().clone());
        let mut orch = orchestrator(true, gate, ledger, halt);

        orch.run_cycle(vec![buy("ETH-USD", dec!(3000), dec!(300))])
            .await
            .unwrap();

        let today = chrono::Utc::now().date_naive();
        let trades = reader.read_trades(today).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "ETH-USD");
        assert_eq!(trades[0].action, TradeAction::Buy);
    }

    #[tokio::test]
    async fn sell_realizes_pnl_into_daily_total() {
        let (_h, gate, ledger, halt) = setup();
        let mut orch = orchestrator(true, gate, ledger, halt);

        orch.run_cycle(vec![buy("BTC-USD", dec!(50000), dec!(500))])
            .await
            .unwrap();
        let report = orch.run_cycle(vec![sell("BTC-USD", dec!(55000))]).await.unwrap();

        assert_eq!(report.executed, 1);
        assert!(!orch.portfolio().holds("BTC-USD"));
        // 0.01 BTC * 5000 profit
        assert_eq!(orch.daily_realized_pnl(), dec!(50));
    }

    #[tokio::test]
    async fn sell_without_position_is_rejected_before_connector() {
        let (_h, gate, ledger, halt) = setup();
        let reader = AuditLedger::new(ledger.dir().clone());
        let mut orch = orchestrator(true, gate, ledger, halt);

        let report = orch.run_cycle(vec![sell("BTC-USD", dec!(50000))]).await.unwrap();

        assert_eq!(report.rejected, 1);
        assert_eq!(report.executed, 0);
        let alerts = reader.read_alerts().unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Info && a.message.contains("no open position")));
    }

    #[tokio::test]
    async fn halt_flag_blocks_the_cycle() {
        let (_h, gate, ledger, halt) = setup();
        halt.set("manual stand-down").unwrap();
        let mut orch = orchestrator(true, gate, ledger, halt);

        let result = orch.run_cycle(vec![buy("BTC-USD", dec!(50000), dec!(100))]).await;

        assert!(matches!(
            result,
            Err(CycleError::Halted { ref reason }) if reason == "manual stand-down"
        ));
        assert!(!orch.portfolio().holds("BTC-USD"));
    }

    #[tokio::test]
    async fn critical_drawdown_sets_durable_halt() {
        let (_h, gate, ledger, halt) = setup();
        let halt_reader = halt.clone();
        let mut orch = orchestrator(true, gate, ledger, halt);

        orch.run_cycle(vec![buy("BTC-USD", dec!(50000), dec!(9000))])
            .await
            .unwrap();
        // Mark the position down far enough for a critical drawdown.
        orch.mark_price("BTC-USD", dec!(30000));

        let result = orch.run_cycle(vec![buy("ETH-USD", dec!(3000), dec!(100))]).await;

        assert!(matches!(result, Err(CycleError::Halted { .. })));
        assert!(halt_reader.is_halted().unwrap());

        // The halt is durable: the next cycle is also refused.
        let next = orch.run_cycle(vec![]).await;
        assert!(matches!(next, Err(CycleError::Halted { .. })));
    }

    #[tokio::test]
    async fn risk_rejection_is_counted_and_alerted() {
        let (_h, gate, ledger, halt) = setup();
        let reader = AuditLedger::new(ledger.dir().clone());
        let mut orch = orchestrator(false, gate, ledger, halt);

        // DOGE-USD is not in the allowed set.
        let report = orch
            .run_cycle(vec![buy("DOGE-USD", dec!(0.10), dec!(100))])
            .await
            .unwrap();

        assert_eq!(report.rejected, 1);
        let alerts = reader.read_alerts().unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Info && a.message.contains("not an allowed")));
    }

    #[tokio::test]
    async fn oversized_trade_defers_until_manually_approved() {
        let (h, gate, ledger, halt) = setup();
        let reviewer = ApprovalGate::open(ApprovalStore::new(h.gate_store_path.clone())).unwrap();
        // Capital high enough that $600 passes the 5% position cap but still
        // exceeds the $500 manual-approval threshold.
        let mut orch = orchestrator_with_capital(false, dec!(20000), gate, ledger, halt);

        let signal = buy("BTC-USD", dec!(50000), dec!(600));
        let report = orch.run_cycle(vec![signal.clone()]).await.unwrap();
        assert_eq!(report.deferred, 1);
        assert!(!orch.portfolio().holds("BTC-USD"));

        let pending = reviewer.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        reviewer.approve(&pending[0].id).unwrap();

        let report = orch.run_cycle(vec![signal]).await.unwrap();
        assert_eq!(report.executed, 1);
        assert!(orch.portfolio().holds("BTC-USD"));
    }

    #[tokio::test]
    async fn deferred_trade_survives_a_restart() {
        let (h, gate, ledger, halt) = setup();
        let logs_dir = ledger.dir().clone();
        let mut orch = orchestrator_with_capital(false, dec!(20000), gate, ledger, halt.clone());

        let signal = buy("BTC-USD", dec!(50000), dec!(600));
        orch.run_cycle(vec![signal.clone()]).await.unwrap();

        let reviewer = ApprovalGate::open(ApprovalStore::new(h.gate_store_path.clone())).unwrap();
        let pending = reviewer.list_pending().unwrap();
        reviewer.approve(&pending[0].id).unwrap();

        // A fresh orchestrator has no in-memory request map; the approval is
        // found in the store by signal key.
        let gate = ApprovalGate::open(ApprovalStore::new(h.gate_store_path.clone())).unwrap();
        let mut orch =
            orchestrator_with_capital(false, dec!(20000), gate, AuditLedger::new(logs_dir), halt);
        let report = orch.run_cycle(vec![signal]).await.unwrap();

        assert_eq!(report.executed, 1);
        assert!(orch.portfolio().holds("BTC-USD"));
    }

    #[tokio::test]
    async fn manually_rejected_trade_is_dropped() {
        let (h, gate, ledger, halt) = setup();
        let reviewer = ApprovalGate::open(ApprovalStore::new(h.gate_store_path.clone())).unwrap();
        let mut orch = orchestrator_with_capital(false, dec!(20000), gate, ledger, halt);

        let signal = buy("BTC-USD", dec!(50000), dec!(600));
        orch.run_cycle(vec![signal.clone()]).await.unwrap();

        let pending = reviewer.list_pending().unwrap();
        reviewer.reject(&pending[0].id, "too large for today").unwrap();

        let report = orch.run_cycle(vec![signal]).await.unwrap();
        assert_eq!(report.rejected, 1);
        assert!(!orch.portfolio().holds("BTC-USD"));
        // The dropped request must not linger and re-defer.
        assert!(orch.pending_requests.is_empty());
    }

    #[tokio::test]
    async fn deferred_signal_stays_deferred_while_pending() {
        let (_h, gate, ledger, halt) = setup();
        let reader = AuditLedger::new(ledger.dir().clone());
        let mut orch = orchestrator_with_capital(false, dec!(20000), gate, ledger, halt);

        let signal = buy("BTC-USD", dec!(50000), dec!(600));
        orch.run_cycle(vec![signal.clone()]).await.unwrap();
        let report = orch.run_cycle(vec![signal]).await.unwrap();

        assert_eq!(report.deferred, 1);
        // No second request was filed for the same signal.
        assert_eq!(orch.gate.list_pending().unwrap().len(), 1);
        // Each deferral, including the repeat, leaves an audit record.
        let alerts = reader.read_alerts().unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Info && a.message.contains("awaiting manual approval")));
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Info && a.message.contains("still awaiting")));
    }

    #[tokio::test]
    async fn approval_for_one_notional_does_not_release_a_larger_trade() {
        let (h, gate, ledger, halt) = setup();
        let reviewer = ApprovalGate::open(ApprovalStore::new(h.gate_store_path.clone())).unwrap();
        let mut orch = orchestrator_with_capital(false, dec!(20000), gate, ledger, halt);

        orch.run_cycle(vec![buy("BTC-USD", dec!(50000), dec!(600))])
            .await
            .unwrap();
        let pending = reviewer.list_pending().unwrap();
        reviewer.approve(&pending[0].id).unwrap();

        // Same strategy, side, and symbol but a larger notional: the $600
        // approval must not cover it.
        let report = orch
            .run_cycle(vec![buy("BTC-USD", dec!(50000), dec!(900))])
            .await
            .unwrap();

        assert_eq!(report.executed, 0);
        assert_eq!(report.deferred, 1);
        assert!(!orch.portfolio().holds("BTC-USD"));
        let pending = reviewer.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].details["size_usd"], serde_json::json!(dec!(900)));
    }

    struct FailingConnector;

    #[async_trait]
    impl ExchangeConnector for FailingConnector {
        async fn place_limit_order(&self, _order: OrderRequest) -> Result<OrderResult> {
            Err(anyhow!("connection refused"))
        }

        async fn place_stop_loss(&self, _order: StopLossRequest) -> Result<OrderResult> {
            Err(anyhow!("connection refused"))
        }

        async fn get_account(&self) -> Result<AccountInfo> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn connector_failures_escalate_after_three() {
        let (_h, gate, ledger, halt) = setup();
        let reader = AuditLedger::new(ledger.dir().clone());
        let mut orch = ExecutionOrchestrator::new(
            OrchestratorConfig::new(true, dec!(10000), RiskLimits::default()),
            FailingConnector,
            gate,
            ledger,
            halt,
        );

        let signals = vec![
            buy("BTC-USD", dec!(50000), dec!(100)),
            buy("ETH-USD", dec!(3000), dec!(100)),
            buy("BTC-USDC", dec!(50000), dec!(100)),
        ];
        let report = orch.run_cycle(signals).await.unwrap();

        assert_eq!(report.failed, 3);
        assert!(!orch.portfolio().holds("BTC-USD"));
        let alerts = reader.read_alerts().unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Critical && a.message.contains("consecutive")));
    }

    struct ErroringStrategy;

    #[async_trait]
    impl Strategy for ErroringStrategy {
        async fn generate_signals(
            &mut self,
            _portfolio: &Portfolio,
            _limits: &RiskLimits,
        ) -> Result<Vec<Signal>> {
            Err(anyhow!("feed unavailable"))
        }

        fn name(&self) -> &str {
            "erroring"
        }
    }

    struct OneBuyStrategy;

    #[async_trait]
    impl Strategy for OneBuyStrategy {
        async fn generate_signals(
            &mut self,
            _portfolio: &Portfolio,
            _limits: &RiskLimits,
        ) -> Result<Vec<Signal>> {
            Ok(vec![Signal {
                symbol: "BTC-USD".to_string(),
                side: Side::Buy,
                price: dec!(50000),
                size_usd: Some(dec!(100)),
                strategy: "one-buy".to_string(),
            }])
        }

        fn name(&self) -> &str {
            "one-buy"
        }
    }

    #[tokio::test]
    async fn failing_strategy_does_not_block_the_others() {
        let (_h, gate, ledger, halt) = setup();
        let reader = AuditLedger::new(ledger.dir().clone());
        let mut orch = orchestrator(true, gate, ledger, halt);

        let mut registry = StrategyRegistry::new();
        registry.register(ErroringStrategy);
        registry.register(OneBuyStrategy);

        let report = orch.run_cycle_with_strategies(&registry).await.unwrap();

        assert_eq!(report.executed, 1);
        assert!(orch.portfolio().holds("BTC-USD"));
        let alerts = reader.read_alerts().unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Error && a.message.contains("erroring")));
    }

    #[tokio::test]
    async fn missing_signal_size_defaults_to_position_cap() {
        let (_h, gate, ledger, halt) = setup();
        let mut orch = orchestrator(true, gate, ledger, halt);

        let signal = Signal {
            symbol: "BTC-USD".to_string(),
            side: Side::Buy,
            price: dec!(50000),
            size_usd: None,
            strategy: "momentum".to_string(),
        };
        orch.run_cycle(vec![signal]).await.unwrap();

        // 10000 * 5% = 500 notional at 50000.
        let position = orch.portfolio().position("BTC-USD").unwrap();
        assert_eq!(position.size, dec!(500) / dec!(50000));
    }
}
