//! Paper trading connector.
//!
//! Fills every order instantly at its limit price without touching an
//! exchange. Useful for exercising the full cycle pipeline in simulation
//! before wiring in a live connector.

use anyhow::Result;
use async_trait::async_trait;
use autotrader_core::{
    AccountInfo, ExchangeConnector, OrderRequest, OrderResult, OrderStatus, StopLossRequest,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

pub struct PaperConnector {
    balances: HashMap<String, Decimal>,
    /// Client order ids already filled. Replaying an id returns the same
    /// result instead of double-filling.
    seen: Mutex<HashMap<String, OrderResult>>,
}

impl PaperConnector {
    #[must_use]
    pub fn new(usd_balance: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert("USD".to_string(), usd_balance);
        Self {
            balances,
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn fill(&self, client_order_id: &str, symbol: &str, price: Decimal) -> OrderResult {
        let mut seen = self.seen.lock();
        if let Some(prior) = seen.get(client_order_id) {
            return prior.clone();
        }

        let result = OrderResult {
            order_id: format!("PAPER-{client_order_id}"),
            status: OrderStatus::Filled,
        };
        seen.insert(client_order_id.to_string(), result.clone());

        info!(
            order_id = %result.order_id,
            symbol = %symbol,
            price = %price,
            "Paper fill simulated"
        );
        result
    }
}

#[async_trait]
impl ExchangeConnector for PaperConnector {
    async fn place_limit_order(&self, order: OrderRequest) -> Result<OrderResult> {
        Ok(self.fill(&order.client_order_id, &order.symbol, order.price))
    }

    async fn place_stop_loss(&self, order: StopLossRequest) -> Result<OrderResult> {
        Ok(self.fill(&order.client_order_id, &order.symbol, order.stop_price))
    }

    async fn get_account(&self) -> Result<AccountInfo> {
        Ok(AccountInfo {
            balances: self.balances.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrader_core::Side;
    use rust_decimal_macros::dec;

    fn order(id: &str) -> OrderRequest {
        OrderRequest {
            client_order_id: id.to_string(),
            symbol: "BTC-USD".to_string(),
            side: Side::Buy,
            size: dec!(0.01),
            price: dec!(65000),
        }
    }

    #[tokio::test]
    async fn orders_fill_instantly() {
        let connector = PaperConnector::new(dec!(10000));
        let result = connector.place_limit_order(order("abc")).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.order_id, "PAPER-abc");
    }

    #[tokio::test]
    async fn replayed_client_order_id_returns_same_fill() {
        let connector = PaperConnector::new(dec!(10000));
        let first = connector.place_limit_order(order("dup")).await.unwrap();
        let second = connector.place_limit_order(order("dup")).await.unwrap();
        assert_eq!(first.order_id, second.order_id);
    }

    #[tokio::test]
    async fn account_reports_seeded_balance() {
        let connector = PaperConnector::new(dec!(2500));
        let account = connector.get_account().await.unwrap();
        assert_eq!(account.balances["USD"], dec!(2500));
    }
}
