//! Order execution errors.
//!
//! None of these are fatal to the scheduler: it logs them with the bot's
//! identity and moves on. A later tick re-evaluates naturally.

use tb_core::TradeRecord;
use tb_core::error::{ExchangeError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("trading rules unavailable for {symbol}: {source}")]
    RulesUnavailable {
        symbol: String,
        #[source]
        source: ExchangeError,
    },

    #[error("quantity {requested} for {symbol} normalizes to zero at step {step_size}")]
    ZeroQuantity { symbol: String, requested: f64, step_size: f64 },

    #[error("notional {notional:.4} for {symbol} is below minimum {min_notional}")]
    BelowMinNotional { symbol: String, notional: f64, min_notional: f64 },

    #[error("missing required order field: {0}")]
    MissingRequiredField(&'static str),

    #[error("intent {0} is not actionable")]
    NotActionable(String),

    #[error("exchange rejected order: {0}")]
    ExchangeRejected(#[source] ExchangeError),

    #[error("exchange unavailable: {0}")]
    ExchangeUnavailable(#[source] ExchangeError),

    /// The order filled but the trade record could not be written.
    #[error("trade record for order {:?} not persisted: {source}", record.order_id)]
    TradeRecordNotPersisted {
        record: Box<TradeRecord>,
        #[source]
        source: StoreError,
    },
}

impl From<ExchangeError> for ExecutionError {
    fn from(e: ExchangeError) -> Self {
        if e.is_transient() { Self::ExchangeUnavailable(e) } else { Self::ExchangeRejected(e) }
    }
}
