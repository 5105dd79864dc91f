//! Persistence boundary for bot configurations, trade records and runtime state.
//!
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! ephemeral runs, and [`JsonFileStore`] for a single-process deployment that
//! keeps everything in a directory of JSON files.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{BotConfiguration, BotId, RuntimeState, TradeRecord};

#[async_trait]
pub trait BotStore: Send + Sync {
    /// All configurations with `is_active == true`, ordered by id.
    async fn load_active_bot_configurations(&self) -> Result<Vec<BotConfiguration>, StoreError>;

    async fn load_bot_configuration(&self, id: BotId) -> Result<Option<BotConfiguration>, StoreError>;

    /// Insert or replace by id.
    async fn upsert_bot_configuration(&self, config: BotConfiguration) -> Result<(), StoreError>;

    /// Append-only.
    async fn persist_trade_record(&self, record: &TradeRecord) -> Result<(), StoreError>;

    /// Trades for one bot in insertion order.
    async fn trade_history(&self, bot_id: BotId) -> Result<Vec<TradeRecord>, StoreError>;

    async fn load_runtime_state(&self, bot_id: BotId) -> Result<Option<RuntimeState>, StoreError>;

    async fn persist_runtime_state(&self, bot_id: BotId, state: &RuntimeState) -> Result<(), StoreError>;
}
