//! Configuration parsing for the trading bot runtime.
//!
//! Everything is read from a single JSON file. Only the `exchange` block has
//! no defaults; it is kept as raw JSON here and deserialized by the gateway
//! crate into its own config type.
//!
//! # Example config
//!
//! ```json
//! {
//!   "app": { "module_name": "tradebot", "log_path": "/tmp/log" },
//!   "exchange": { "api_key": "...", "secret_key": "...", "testnet": true },
//!   "scheduler": { "interval_secs": 60, "misfire_grace_secs": 30, "execution_mode": "simulated" },
//!   "fanout": { "reconnect_backoff_secs": 5, "relay_addr": "127.0.0.1:8765" },
//!   "store": { "path": "./data" },
//!   "bots": [{ "id": 1, "bot_type": "momentum", "settings": { "symbol": "BTCUSDT" } }]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::BotConfiguration;

/// Top-level application config.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppMeta,

    /// Exchange connection settings, interpreted by the gateway crate.
    #[serde(default)]
    pub exchange: serde_json::Value,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Bots upserted into the store at startup.
    #[serde(default)]
    pub bots: Vec<BotConfiguration>,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct AppMeta {
    #[serde(default = "default_module_name")]
    pub module_name: String,
    pub log_path: Option<String>,
}

impl Default for AppMeta {
    fn default() -> Self {
        Self { module_name: default_module_name(), log_path: None }
    }
}

/// Whether the executor talks to the exchange or only records simulated fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Live,
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// A tick starting later than this past its scheduled instant is skipped.
    #[serde(default = "default_misfire_grace_secs")]
    pub misfire_grace_secs: u64,

    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn misfire_grace(&self) -> Duration {
        Duration::from_secs(self.misfire_grace_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            misfire_grace_secs: default_misfire_grace_secs(),
            execution_mode: ExecutionMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Per-subscriber queue depth.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// `host:port` for the WebSocket relay. Relay disabled when absent.
    pub relay_addr: Option<String>,
}

impl FanoutConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            subscriber_buffer: default_subscriber_buffer(),
            relay_addr: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Directory for the JSON file store; in-memory store when absent.
    pub path: Option<String>,
}

fn default_module_name() -> String {
    "tradebot".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_misfire_grace_secs() -> u64 {
    30
}

fn default_reconnect_backoff_secs() -> u64 {
    5
}

fn default_subscriber_buffer() -> usize {
    256
}

impl AppConfig {
    /// Parse and validate a config document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Invalid("scheduler.interval_secs must be > 0".into()));
        }
        if self.fanout.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid("fanout.subscriber_buffer must be > 0".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for bot in &self.bots {
            if !seen.insert(bot.id) {
                return Err(ConfigError::Invalid(format!("duplicate bot id {}", bot.id)));
            }
        }
        Ok(())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
    AppConfig::from_json(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_document() {
        let cfg = AppConfig::from_json("{}").unwrap();
        assert_eq!(cfg.scheduler.interval(), Duration::from_secs(60));
        assert_eq!(cfg.scheduler.misfire_grace(), Duration::from_secs(30));
        assert_eq!(cfg.scheduler.execution_mode, ExecutionMode::Simulated);
        assert_eq!(cfg.fanout.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(cfg.fanout.subscriber_buffer, 256);
        assert_eq!(cfg.app.module_name, "tradebot");
        assert!(cfg.store.path.is_none());
        assert!(cfg.bots.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let json = r#"{
            "app": { "module_name": "bots", "log_path": "/tmp/log" },
            "exchange": { "api_key": "k", "secret_key": "s", "testnet": true },
            "scheduler": { "interval_secs": 10, "execution_mode": "live" },
            "fanout": { "relay_addr": "127.0.0.1:9000" },
            "bots": [
                { "id": 1, "bot_type": "grid", "settings": { "symbol": "BTCUSDT" } },
                { "id": 2, "bot_type": "dca", "settings": { "symbol": "ETHUSDT" }, "is_active": false }
            ]
        }"#;
        let cfg = AppConfig::from_json(json).unwrap();
        assert_eq!(cfg.scheduler.execution_mode, ExecutionMode::Live);
        assert_eq!(cfg.scheduler.interval_secs, 10);
        assert_eq!(cfg.fanout.relay_addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cfg.exchange["testnet"], true);
        assert_eq!(cfg.bots.len(), 2);
        assert!(!cfg.bots[1].is_active);
    }

    #[test]
    fn rejects_zero_interval_and_duplicate_ids() {
        let err = AppConfig::from_json(r#"{"scheduler":{"interval_secs":0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let dup = r#"{"bots":[{"id":1,"bot_type":"grid"},{"id":1,"bot_type":"dca"}]}"#;
        assert!(matches!(AppConfig::from_json(dup), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
