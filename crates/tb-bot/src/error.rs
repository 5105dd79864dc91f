//! Strategy and scheduler error types.

use tb_core::BotId;
use tb_core::error::{ExchangeError, StoreError};
use thiserror::Error;

/// Per-bot configuration or computation problems. Never fatal to a tick.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StrategyError {
    #[error("unsupported bot type '{0}'")]
    UnsupportedBotType(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("indicator error: {0}")]
    Indicator(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Connectivity check failed; the whole tick was skipped.
    #[error("exchange unavailable, tick skipped: {0}")]
    ExchangeUnavailable(#[source] ExchangeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("bot {0} not found")]
    BotNotFound(BotId),
}
