//! Directory-backed JSON store.
//!
//! Layout:
//! - `bots.json`: array of bot configurations
//! - `trades.jsonl`: one trade record per line, append-only
//! - `state.json`: runtime state keyed by bot id
//!
//! Configurations and state are cached in memory and the whole file is
//! rewritten (write to temp, then rename) on every change. All mutations go
//! through one async mutex so concurrent writers cannot interleave.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::BotStore;
use crate::error::StoreError;
use crate::types::{BotConfiguration, BotId, RuntimeState, TradeRecord};

const BOTS_FILE: &str = "bots.json";
const TRADES_FILE: &str = "trades.jsonl";
const STATE_FILE: &str = "state.json";

struct Cache {
    bots: BTreeMap<BotId, BotConfiguration>,
    states: AHashMap<BotId, RuntimeState>,
}

pub struct JsonFileStore {
    dir: PathBuf,
    cache: Mutex<Cache>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let bots: Vec<BotConfiguration> = read_json_or_default(&dir.join(BOTS_FILE)).await?;
        let states: AHashMap<BotId, RuntimeState> = read_json_or_default(&dir.join(STATE_FILE)).await?;
        info!("[store] opened {} ({} bots, {} states)", dir.display(), bots.len(), states.len());

        Ok(Self {
            dir,
            cache: Mutex::new(Cache {
                bots: bots.into_iter().map(|b| (b.id, b)).collect(),
                states,
            }),
        })
    }

    async fn write_atomic(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

async fn read_json_or_default<T>(path: &Path) -> Result<T, StoreError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(T::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BotStore for JsonFileStore {
    async fn load_active_bot_configurations(&self) -> Result<Vec<BotConfiguration>, StoreError> {
        let cache = self.cache.lock().await;
        Ok(cache.bots.values().filter(|b| b.is_active).cloned().collect())
    }

    async fn load_bot_configuration(&self, id: BotId) -> Result<Option<BotConfiguration>, StoreError> {
        Ok(self.cache.lock().await.bots.get(&id).cloned())
    }

    async fn upsert_bot_configuration(&self, config: BotConfiguration) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        cache.bots.insert(config.id, config);
        let list: Vec<&BotConfiguration> = cache.bots.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;
        self.write_atomic(BOTS_FILE, bytes).await
    }

    async fn persist_trade_record(&self, record: &TradeRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.cache.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(TRADES_FILE))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn trade_history(&self, bot_id: BotId) -> Result<Vec<TradeRecord>, StoreError> {
        let text = match tokio::fs::read_to_string(self.dir.join(TRADES_FILE)).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            match serde_json::from_str::<TradeRecord>(line) {
                Ok(record) if record.bot_id == bot_id => out.push(record),
                Ok(_) => {}
                Err(e) => warn!("[store] skipping unreadable trade line {}: {e}", n + 1),
            }
        }
        Ok(out)
    }

    async fn load_runtime_state(&self, bot_id: BotId) -> Result<Option<RuntimeState>, StoreError> {
        Ok(self.cache.lock().await.states.get(&bot_id).cloned())
    }

    async fn persist_runtime_state(&self, bot_id: BotId, state: &RuntimeState) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        cache.states.insert(bot_id, state.clone());
        let bytes = serde_json::to_vec_pretty(&cache.states)?;
        self.write_atomic(STATE_FILE, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GridState, TradeAction};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn record(bot_id: BotId, price: f64) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            bot_id,
            symbol: "BTCUSDT".into(),
            action: TradeAction::SimBuy,
            intent: "BUY".into(),
            price,
            quantity: 0.01,
            order_id: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store
                .upsert_bot_configuration(BotConfiguration::new(3, "grid", json!({ "symbol": "BTCUSDT" })))
                .await
                .unwrap();
            let mut grid = GridState::default();
            grid.open(0, 48000.0, 0.0002);
            store.persist_runtime_state(3, &RuntimeState::Grid(grid)).await.unwrap();
            store.persist_trade_record(&record(3, 48000.0)).await.unwrap();
            store.persist_trade_record(&record(4, 1.0)).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let bots = store.load_active_bot_configurations().await.unwrap();
        assert_eq!(bots.len(), 1);
        match store.load_runtime_state(3).await.unwrap() {
            Some(RuntimeState::Grid(g)) => assert!(g.has_open_buy(0)),
            other => panic!("unexpected state {other:?}"),
        }
        let history = store.trade_history(3).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 48000.0);
    }

    #[tokio::test]
    async fn empty_directory_has_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert!(store.trade_history(1).await.unwrap().is_empty());
        assert!(store.load_runtime_state(1).await.unwrap().is_none());
    }
}
