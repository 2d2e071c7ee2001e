use crate::events::{Side, Signal};
use crate::limits::RiskLimits;
use crate::portfolio::Portfolio;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A limit order as handed to a connector. `client_order_id` is the caller's
/// idempotency key: retrying with the same id must not double-execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
}

/// A stop-loss order request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub stop_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balances: HashMap<String, Decimal>,
}

/// Exchange order-placement boundary. Implementations live outside this
/// core; the orchestrator only depends on this contract.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    async fn place_limit_order(&self, order: OrderRequest) -> Result<OrderResult>;
    async fn place_stop_loss(&self, order: StopLossRequest) -> Result<OrderResult>;
    async fn get_account(&self) -> Result<AccountInfo>;
}

/// A named signal generator. Registered by name; the orchestrator collects
/// each strategy's signals with per-strategy failure isolation.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn generate_signals(
        &mut self,
        portfolio: &Portfolio,
        limits: &RiskLimits,
    ) -> Result<Vec<Signal>>;

    fn name(&self) -> &str;
}
