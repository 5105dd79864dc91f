//! The exchange boundary consumed by the scheduler, executor and fan-out.
//!
//! Implementations must be shareable across tasks (`Send + Sync`) because a
//! single handle is reused by every component for the life of the process.

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::ExchangeError;
use crate::types::{Candle, OrderRequest, OrderResult, PriceTick, SymbolTradingRules};

/// Live price updates for one symbol.
///
/// The stream is infinite while healthy. It yields an error or ends when the
/// connection breaks and is never restarted internally: callers reopen it.
pub type PriceStream = BoxStream<'static, Result<PriceTick, ExchangeError>>;

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Connectivity check.
    async fn ping(&self) -> Result<(), ExchangeError>;

    /// Last traded price.
    async fn get_ticker(&self, symbol: &str) -> Result<f64, ExchangeError>;

    /// Most recent `limit` candles, oldest first.
    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        start_time_ms: Option<i64>,
        end_time_ms: Option<i64>,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Quantization rules; `SymbolUnknown` when the exchange does not list it.
    async fn get_symbol_rules(&self, symbol: &str) -> Result<SymbolTradingRules, ExchangeError>;

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError>;

    async fn open_price_stream(&self, symbol: &str) -> Result<PriceStream, ExchangeError>;
}
