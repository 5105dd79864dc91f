//! Binance REST/stream payload parsing.
//!
//! Binance encodes most numbers as JSON strings (`"30000.50"`), so every
//! numeric read goes through [`parse_str_f64`], which accepts both forms.

use serde_json::Value;
use tb_core::error::ExchangeError;
use tb_core::{Candle, Fill, OrderResult, OrderStatus, PriceTick, SymbolTradingRules};

/// Minimum notional used when the symbol lists no notional filter.
pub const DEFAULT_MIN_NOTIONAL: f64 = 5.0;

/// Binance error code for an unknown symbol.
const CODE_INVALID_SYMBOL: i64 = -1121;

#[inline]
pub fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    match v.as_str() {
        Some(s) => s.parse().ok(),
        None => v.as_f64(),
    }
}

#[inline]
pub fn parse_f64_field(v: &Value, key: &str) -> Option<f64> {
    parse_str_f64(v.get(key))
}

fn malformed(what: &str) -> ExchangeError {
    ExchangeError::Malformed(format!("missing or invalid {what}"))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Classify a non-success HTTP response.
pub fn map_http_error(status: u16, body: &str, symbol: Option<&str>) -> ExchangeError {
    if status == 429 || status == 418 {
        return ExchangeError::RateLimited(format!("HTTP {status}"));
    }
    if status >= 500 {
        return ExchangeError::Unavailable(format!("HTTP {status}"));
    }

    let parsed: Option<(i64, String)> = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        let code = v.get("code")?.as_i64()?;
        let msg = v.get("msg").and_then(Value::as_str).unwrap_or_default().to_string();
        Some((code, msg))
    });

    match parsed {
        Some((CODE_INVALID_SYMBOL, _)) => {
            ExchangeError::SymbolUnknown(symbol.unwrap_or_default().to_string())
        }
        Some((code, message)) => ExchangeError::Rejected { code, message },
        None => ExchangeError::Rejected { code: i64::from(status), message: body.to_string() },
    }
}

// ---------------------------------------------------------------------------
// REST payloads
// ---------------------------------------------------------------------------

/// `GET /api/v3/ticker/price` → price.
pub fn parse_ticker_price(v: &Value) -> Result<f64, ExchangeError> {
    parse_f64_field(v, "price").ok_or_else(|| malformed("ticker price"))
}

/// `GET /api/v3/klines` → candles, oldest first.
///
/// Each row is `[openTime, open, high, low, close, volume, closeTime, ...]`.
pub fn parse_klines(v: &Value) -> Result<Vec<Candle>, ExchangeError> {
    let rows = v.as_array().ok_or_else(|| malformed("kline array"))?;
    rows.iter()
        .map(|row| -> Result<Candle, ExchangeError> {
            let r = row.as_array().ok_or_else(|| malformed("kline row"))?;
            let num = |i: usize| parse_str_f64(r.get(i)).ok_or_else(|| malformed("kline field"));
            let ms = |i: usize| r.get(i).and_then(Value::as_i64).ok_or_else(|| malformed("kline time"));
            Ok(Candle {
                open_time_ms: ms(0)?,
                open: num(1)?,
                high: num(2)?,
                low: num(3)?,
                close: num(4)?,
                volume: num(5)?,
                close_time_ms: ms(6)?,
            })
        })
        .collect()
}

/// `GET /api/v3/exchangeInfo?symbol=` → trading rules of that symbol.
pub fn parse_symbol_rules(v: &Value, symbol: &str) -> Result<SymbolTradingRules, ExchangeError> {
    let entry = v
        .get("symbols")
        .and_then(Value::as_array)
        .and_then(|list| {
            list.iter().find(|s| s.get("symbol").and_then(Value::as_str) == Some(symbol))
        })
        .ok_or_else(|| ExchangeError::SymbolUnknown(symbol.to_string()))?;

    let filters = entry.get("filters").and_then(Value::as_array).cloned().unwrap_or_default();
    let filter = |kind: &str| {
        filters.iter().find(|f| f.get("filterType").and_then(Value::as_str) == Some(kind))
    };

    let defaults = SymbolTradingRules::default();
    let step_size = filter("LOT_SIZE")
        .and_then(|f| parse_f64_field(f, "stepSize"))
        .unwrap_or(defaults.step_size);
    let tick_size = filter("PRICE_FILTER")
        .and_then(|f| parse_f64_field(f, "tickSize"))
        .unwrap_or(defaults.tick_size);
    let min_notional = filter("MIN_NOTIONAL")
        .or_else(|| filter("NOTIONAL"))
        .and_then(|f| parse_f64_field(f, "minNotional"))
        .unwrap_or(DEFAULT_MIN_NOTIONAL);

    Ok(SymbolTradingRules { step_size, tick_size, min_notional })
}

/// `POST /api/v3/order` with `newOrderRespType=FULL`.
pub fn parse_order_response(v: &Value) -> Result<OrderResult, ExchangeError> {
    let order_id = match v.get("orderId") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => return Err(malformed("orderId")),
    };
    let status = v
        .get("status")
        .and_then(Value::as_str)
        .map(OrderStatus::from_exchange)
        .ok_or_else(|| malformed("order status"))?;

    let fills = v
        .get("fills")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|f| {
                    Some(Fill {
                        price: parse_f64_field(f, "price")?,
                        qty: parse_f64_field(f, "qty")?,
                        commission: parse_f64_field(f, "commission").unwrap_or(0.0),
                        commission_asset: f
                            .get("commissionAsset")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(OrderResult {
        order_id,
        client_order_id: v.get("clientOrderId").and_then(Value::as_str).map(str::to_string),
        status,
        executed_qty: parse_f64_field(v, "executedQty").unwrap_or(0.0),
        price: parse_f64_field(v, "price").unwrap_or(0.0),
        cumulative_quote_qty: parse_f64_field(v, "cummulativeQuoteQty").unwrap_or(0.0),
        fills,
    })
}

// ---------------------------------------------------------------------------
// Stream payloads
// ---------------------------------------------------------------------------

/// Parse a `<symbol>@ticker` frame. Returns `None` for anything that is not a
/// `24hrTicker` event (subscription acks, other event types).
pub fn parse_ticker_event(text: &str) -> Option<PriceTick> {
    let v: Value = serde_json::from_str(text).ok()?;
    if v.get("e")?.as_str()? != "24hrTicker" {
        return None;
    }
    Some(PriceTick {
        symbol: v.get("s")?.as_str()?.to_string(),
        price: parse_f64_field(&v, "c")?,
        price_change_pct: parse_f64_field(&v, "P").unwrap_or(0.0),
        volume: parse_f64_field(&v, "v").unwrap_or(0.0),
        event_time_ms: v.get("E").and_then(Value::as_i64).unwrap_or(0),
    })
}
