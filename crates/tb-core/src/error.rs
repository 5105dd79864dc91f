//! Typed error definitions shared across the workspace.
//!
//! Each collaborator boundary gets its own enum so callers can tell "skip and
//! continue" from "retry later" without string matching. All variants go
//! through `thiserror`, so they compose with `anyhow::Result` in the binary.

use thiserror::Error;

/// Failures reported by an [`ExchangeGateway`](crate::gateway::ExchangeGateway).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExchangeError {
    /// Network failure, timeout or exchange-side 5xx.
    #[error("exchange unavailable: {0}")]
    Unavailable(String),

    /// HTTP 429 / 418 from the exchange.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Request-level validation failure reported by the exchange.
    #[error("exchange rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("unknown symbol: {0}")]
    SymbolUnknown(String),

    /// Response body could not be understood.
    #[error("malformed exchange response: {0}")]
    Malformed(String),

    /// Streaming connection ended or broke; it must be reopened.
    #[error("price stream closed: {0}")]
    StreamClosed(String),
}

impl ExchangeError {
    /// Whether retrying later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited(_) | Self::StreamClosed(_))
    }
}

/// Failures of the bot/trade/state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store rejected write: {0}")]
    WriteRejected(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
