//! Binance spot gateway configuration.
//!
//! Only the credentials are needed for live trading. URLs default to the
//! production endpoints, or to the spot testnet when `testnet` is set; an
//! explicit `rest_url` / `stream_url` always wins.

use serde::Deserialize;
use tb_core::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default)]
    pub testnet: bool,

    /// REST base URL override.
    pub rest_url: Option<String>,

    /// Market stream base URL override (`.../ws`).
    pub stream_url: Option<String>,

    /// `recvWindow` for signed requests in milliseconds.
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            testnet: false,
            rest_url: None,
            stream_url: None,
            recv_window: default_recv_window(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl BinanceConfig {
    /// Deserialize from the raw `exchange` block of the app config.
    /// `null` yields the defaults.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(Self::deserialize(value)?)
    }

    pub fn rest_base(&self) -> String {
        match &self.rest_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.testnet => "https://testnet.binance.vision".into(),
            None => "https://api.binance.com".into(),
        }
    }

    pub fn stream_base(&self) -> String {
        match &self.stream_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.testnet => "wss://stream.testnet.binance.vision/ws".into(),
            None => "wss://stream.binance.com:9443/ws".into(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn testnet_selects_testnet_urls() {
        let cfg = BinanceConfig::from_value(&json!({ "testnet": true })).unwrap();
        assert_eq!(cfg.rest_base(), "https://testnet.binance.vision");
        assert_eq!(cfg.stream_base(), "wss://stream.testnet.binance.vision/ws");
        assert!(!cfg.has_credentials());
    }

    #[test]
    fn overrides_win() {
        let cfg = BinanceConfig::from_value(&json!({
            "api_key": "k", "secret_key": "s",
            "testnet": true, "rest_url": "http://127.0.0.1:8080/"
        }))
        .unwrap();
        assert_eq!(cfg.rest_base(), "http://127.0.0.1:8080");
        assert_eq!(cfg.recv_window, 5000);
        assert!(cfg.has_credentials());
    }

    #[test]
    fn null_block_is_default() {
        let cfg = BinanceConfig::from_value(&serde_json::Value::Null).unwrap();
        assert_eq!(cfg.rest_base(), "https://api.binance.com");
        assert_eq!(cfg.stream_base(), "wss://stream.binance.com:9443/ws");
    }
}
