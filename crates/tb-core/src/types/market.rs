//! Market data values returned by the exchange gateway.

use serde::{Deserialize, Serialize};

/// One OHLCV row. Timestamps are exchange milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time_ms: i64,
}

impl Candle {
    /// Flat candle at `price`, handy for building synthetic series.
    pub fn flat(open_time_ms: i64, price: f64) -> Self {
        Self {
            open_time_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            close_time_ms: open_time_ms,
        }
    }
}

/// A single streamed price update for one symbol.
///
/// This is also the JSON payload the relay pushes to downstream clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    /// 24h change in percent.
    pub price_change_pct: f64,
    /// 24h base volume.
    pub volume: f64,
    pub event_time_ms: i64,
}

/// Exchange quantization and sizing rules for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolTradingRules {
    /// Quantity granularity (`LOT_SIZE.stepSize`).
    pub step_size: f64,
    /// Price granularity (`PRICE_FILTER.tickSize`).
    pub tick_size: f64,
    /// Smallest accepted order value in quote currency.
    pub min_notional: f64,
}

impl Default for SymbolTradingRules {
    fn default() -> Self {
        Self {
            step_size: 0.00001,
            tick_size: 0.01,
            min_notional: 5.0,
        }
    }
}
