use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::BotStore;
use crate::error::StoreError;
use crate::types::{BotConfiguration, BotId, RuntimeState, TradeRecord};

/// In-process store. State is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    bots: RwLock<BTreeMap<BotId, BotConfiguration>>,
    trades: RwLock<Vec<TradeRecord>>,
    states: RwLock<AHashMap<BotId, RuntimeState>>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make trade and state writes fail with `WriteRejected`.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            Err(StoreError::WriteRejected("memory store is read-only".into()))
        } else {
            Ok(())
        }
    }

    pub async fn all_trades(&self) -> Vec<TradeRecord> {
        self.trades.read().await.clone()
    }
}

#[async_trait]
impl BotStore for MemoryStore {
    async fn load_active_bot_configurations(&self) -> Result<Vec<BotConfiguration>, StoreError> {
        Ok(self.bots.read().await.values().filter(|b| b.is_active).cloned().collect())
    }

    async fn load_bot_configuration(&self, id: BotId) -> Result<Option<BotConfiguration>, StoreError> {
        Ok(self.bots.read().await.get(&id).cloned())
    }

    async fn upsert_bot_configuration(&self, config: BotConfiguration) -> Result<(), StoreError> {
        self.bots.write().await.insert(config.id, config);
        Ok(())
    }

    async fn persist_trade_record(&self, record: &TradeRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.trades.write().await.push(record.clone());
        Ok(())
    }

    async fn trade_history(&self, bot_id: BotId) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(self.trades.read().await.iter().filter(|t| t.bot_id == bot_id).cloned().collect())
    }

    async fn load_runtime_state(&self, bot_id: BotId) -> Result<Option<RuntimeState>, StoreError> {
        Ok(self.states.read().await.get(&bot_id).cloned())
    }

    async fn persist_runtime_state(&self, bot_id: BotId, state: &RuntimeState) -> Result<(), StoreError> {
        self.check_writable()?;
        self.states.write().await.insert(bot_id, state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DcaState, MomentumState};
    use serde_json::json;

    #[tokio::test]
    async fn only_active_bots_are_loaded() {
        let store = MemoryStore::new();
        let mut inactive = BotConfiguration::new(2, "grid", json!({ "symbol": "ETHUSDT" }));
        inactive.is_active = false;
        store.upsert_bot_configuration(inactive).await.unwrap();
        store
            .upsert_bot_configuration(BotConfiguration::new(1, "momentum", json!({ "symbol": "BTCUSDT" })))
            .await
            .unwrap();

        let active = store.load_active_bot_configurations().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 1);
        assert!(store.load_bot_configuration(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejected_writes_surface_as_errors() {
        let store = MemoryStore::new();
        store.reject_writes(true);
        let state = RuntimeState::Momentum(MomentumState::default());
        let err = store.persist_runtime_state(1, &state).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected(_)));

        store.reject_writes(false);
        let dca = RuntimeState::Dca(DcaState { position_active: true, ..Default::default() });
        store.persist_runtime_state(1, &dca).await.unwrap();
        assert_eq!(store.load_runtime_state(1).await.unwrap(), Some(dca));
    }
}
