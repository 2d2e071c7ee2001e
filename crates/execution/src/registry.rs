//! Named strategy registry.
//!
//! Strategies are registered by name as trait objects; the orchestrator
//! iterates them in registration order when gathering signals.

use autotrader_core::Strategy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct StrategyRegistry {
    order: Vec<String>,
    strategies: HashMap<String, Arc<Mutex<dyn Strategy>>>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a strategy under its own name, replacing any previous
    /// registration of the same name.
    pub fn register(&mut self, strategy: impl Strategy + 'static) {
        let name = strategy.name().to_string();
        if !self.strategies.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.strategies.insert(name, Arc::new(Mutex::new(strategy)));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn Strategy>>> {
        self.strategies.get(name).cloned()
    }

    /// Strategy names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Strategies in registration order.
    #[must_use]
    pub fn iter(&self) -> Vec<(String, Arc<Mutex<dyn Strategy>>)> {
        self.order
            .iter()
            .filter_map(|name| self.strategies.get(name).map(|s| (name.clone(), s.clone())))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
