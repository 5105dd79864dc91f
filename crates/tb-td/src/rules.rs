//! Per-symbol trading-rules cache.
//!
//! Entries are fetched on first use and kept for the life of the process.
//! Two callers missing the same symbol at once may both fetch; the second
//! insert just overwrites the first with identical data.

use std::sync::Arc;

use ahash::AHashMap;
use tb_core::SymbolTradingRules;
use tb_core::error::ExchangeError;
use tb_core::gateway::ExchangeGateway;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct RulesCache {
    entries: RwLock<AHashMap<String, SymbolTradingRules>>,
}

impl RulesCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn get(&self, symbol: &str) -> Option<SymbolTradingRules> {
        self.entries.read().await.get(symbol).copied()
    }

    pub async fn get_or_fetch(
        &self,
        gateway: &dyn ExchangeGateway,
        symbol: &str,
    ) -> Result<SymbolTradingRules, ExchangeError> {
        if let Some(rules) = self.get(symbol).await {
            return Ok(rules);
        }
        let rules = gateway.get_symbol_rules(symbol).await?;
        debug!(
            "[rules] cached {symbol}: step={} tick={} min_notional={}",
            rules.step_size, rules.tick_size, rules.min_notional
        );
        self.entries.write().await.insert(symbol.to_string(), rules);
        Ok(rules)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_core::gateway::mock::MockGateway;

    #[tokio::test]
    async fn fetches_once_then_serves_from_cache() {
        let gw = MockGateway::new();
        let rules = SymbolTradingRules { step_size: 0.001, tick_size: 0.01, min_notional: 10.0 };
        gw.set_rules("BTCUSDT", rules);
        let cache = RulesCache::new();

        assert_eq!(cache.get_or_fetch(&gw, "BTCUSDT").await.unwrap(), rules);
        gw.set_rules("BTCUSDT", SymbolTradingRules::default());
        assert_eq!(cache.get_or_fetch(&gw, "BTCUSDT").await.unwrap(), rules);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_cached() {
        let gw = MockGateway::new();
        let cache = RulesCache::new();
        let err = cache.get_or_fetch(&gw, "NOPE").await.unwrap_err();
        assert!(matches!(err, ExchangeError::SymbolUnknown(_)));
        assert_eq!(cache.len().await, 0);
    }
}
