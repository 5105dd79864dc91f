//! Trend following on a moving-average crossover, confirmed by MACD and
//! bounded by RSI.
//!
//! Rows with any indicator still warming up are dropped. The signal compares
//! the last two complete rows:
//!
//! - BUY: short MA crosses above long MA, MACD above its signal with a
//!   positive histogram, RSI below the overbought bound
//! - SELL: the mirror image, with RSI above the oversold bound
//! - HOLD otherwise

use serde::Deserialize;
use tb_core::gateway::ExchangeGateway;
use tb_core::{IntentKind, MomentumState, RuntimeState, Side, Sizing, TradeIntent, TradeRecord};
use tracing::debug;

use super::Evaluation;
use crate::error::StrategyError;
use crate::indicators;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MomentumParams {
    #[serde(deserialize_with = "crate::strategy::deserialize_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_kline_limit")]
    pub kline_limit: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_ma_short")]
    pub ma_short_period: usize,
    #[serde(default = "default_ma_long")]
    pub ma_long_period: usize,
    /// Quote amount spent on a BUY.
    #[serde(default = "default_quote_amount")]
    pub quote_amount: f64,
    /// Base quantity sold when no bought position is tracked.
    #[serde(default)]
    pub order_quantity: Option<f64>,
}

fn default_interval() -> String {
    "1h".into()
}
fn default_kline_limit() -> usize {
    100
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_oversold() -> f64 {
    30.0
}
fn default_rsi_overbought() -> f64 {
    70.0
}
fn default_macd_fast() -> usize {
    12
}
fn default_macd_slow() -> usize {
    26
}
fn default_macd_signal() -> usize {
    9
}
fn default_ma_short() -> usize {
    9
}
fn default_ma_long() -> usize {
    21
}
fn default_quote_amount() -> f64 {
    10.0
}

impl MomentumParams {
    pub fn validated(self) -> Result<Self, StrategyError> {
        let invalid = |m: String| Err(StrategyError::InvalidParameters(m));
        if self.ma_short_period == 0 || self.ma_short_period >= self.ma_long_period {
            return invalid(format!(
                "ma_short_period ({}) must be positive and below ma_long_period ({})",
                self.ma_short_period, self.ma_long_period
            ));
        }
        if self.macd_fast == 0 || self.macd_fast >= self.macd_slow || self.macd_signal == 0 {
            return invalid(format!(
                "MACD periods {}/{}/{} are not usable",
                self.macd_fast, self.macd_slow, self.macd_signal
            ));
        }
        if self.rsi_period == 0 || self.rsi_oversold >= self.rsi_overbought {
            return invalid("RSI period must be positive and oversold below overbought".into());
        }
        if !(self.quote_amount.is_finite() && self.quote_amount > 0.0) {
            return invalid(format!("quote_amount must be positive, got {}", self.quote_amount));
        }
        if self.kline_limit < 2 {
            return invalid("kline_limit must be at least 2".into());
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// One complete indicator row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorRow {
    pub close: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub ma_short: f64,
    pub ma_long: f64,
}

/// Indicator rows for `closes`, keeping only rows where every value is ready.
pub fn indicator_rows(closes: &[f64], p: &MomentumParams) -> Result<Vec<IndicatorRow>, StrategyError> {
    let rsi = indicators::rsi(closes, p.rsi_period)?;
    let macd = indicators::macd(closes, p.macd_fast, p.macd_slow, p.macd_signal)?;
    let short = indicators::sma(closes, p.ma_short_period)?;
    let long = indicators::sma(closes, p.ma_long_period)?;

    Ok(closes
        .iter()
        .enumerate()
        .filter_map(|(i, &close)| {
            let m = macd[i]?;
            Some(IndicatorRow {
                close,
                rsi: rsi[i]?,
                macd: m.macd,
                macd_signal: m.signal,
                macd_hist: m.histogram,
                ma_short: short[i]?,
                ma_long: long[i]?,
            })
        })
        .collect())
}

pub fn classify(prev: &IndicatorRow, latest: &IndicatorRow, p: &MomentumParams) -> Signal {
    let crossed_up = prev.ma_short <= prev.ma_long && latest.ma_short > latest.ma_long;
    let crossed_down = prev.ma_short >= prev.ma_long && latest.ma_short < latest.ma_long;

    if crossed_up
        && latest.macd > latest.macd_signal
        && latest.macd_hist > 0.0
        && latest.rsi < p.rsi_overbought
    {
        Signal::Buy
    } else if crossed_down
        && latest.macd < latest.macd_signal
        && latest.macd_hist < 0.0
        && latest.rsi > p.rsi_oversold
    {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Signal from a close series plus the last complete row.
pub fn signal_from_closes(closes: &[f64], p: &MomentumParams) -> Result<(Signal, IndicatorRow), StrategyError> {
    let rows = indicator_rows(closes, p)?;
    match rows.as_slice() {
        [.., prev, latest] => Ok((classify(prev, latest, p), *latest)),
        _ => Err(StrategyError::Indicator(format!(
            "insufficient data: {} complete rows from {} candles",
            rows.len(),
            closes.len()
        ))),
    }
}

pub(super) async fn evaluate(p: &MomentumParams, gateway: &dyn ExchangeGateway, state: MomentumState) -> Evaluation {
    let candles = match gateway.get_candles(&p.symbol, &p.interval, p.kline_limit, None, None).await {
        Ok(c) => c,
        Err(e) => {
            return Evaluation::hold(&p.symbol, RuntimeState::Momentum(state), format!("candles unavailable: {e}"));
        }
    };
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let (signal, row) = match signal_from_closes(&closes, p) {
        Ok(v) => v,
        Err(e) => return Evaluation::hold(&p.symbol, RuntimeState::Momentum(state), e.to_string()),
    };
    debug!(
        "[momentum] {} close={} rsi={:.2} macd={:.4}/{:.4} ma={:.2}/{:.2} -> {signal:?}",
        p.symbol, row.close, row.rsi, row.macd, row.macd_signal, row.ma_short, row.ma_long
    );

    let mut diagnostic = None;
    let intent = match signal {
        Signal::Buy => TradeIntent::market(IntentKind::Buy, &p.symbol, Sizing::Quote(p.quote_amount), Some(row.close)),
        Signal::Sell => {
            let qty = Some(state.position_quantity).filter(|q| *q > 0.0).or(p.order_quantity);
            match qty {
                Some(q) => TradeIntent::market(IntentKind::Sell, &p.symbol, Sizing::Base(q), Some(row.close)),
                None => {
                    let msg = "sell signal without a position or order_quantity".to_string();
                    diagnostic = Some(msg.clone());
                    TradeIntent::hold(&p.symbol, msg)
                }
            }
        }
        Signal::Hold => TradeIntent::hold(&p.symbol, "no crossover signal"),
    };

    Evaluation {
        intents: vec![intent],
        state: RuntimeState::Momentum(state),
        reference_price: Some(row.close),
        diagnostic,
    }
}

pub(super) fn apply_fill(state: &mut MomentumState, intent: &TradeIntent, record: &TradeRecord) {
    match intent.kind.side() {
        Some(Side::Buy) => {
            state.position_quantity += record.quantity;
            state.last_action = Some(Side::Buy);
        }
        Some(Side::Sell) => {
            state.position_quantity = (state.position_quantity - record.quantity).max(0.0);
            state.last_action = Some(Side::Sell);
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tb_core::gateway::mock::MockGateway;
    use tb_core::{BotConfiguration, Candle};

    fn params() -> MomentumParams {
        let cfg = BotConfiguration::new(1, "momentum", json!({ "symbol": "btcusdt" }));
        crate::strategy::parse_settings::<MomentumParams>(&cfg).unwrap().validated().unwrap()
    }

    fn row(ma_short: f64, ma_long: f64, macd: f64, macd_signal: f64, rsi: f64) -> IndicatorRow {
        IndicatorRow {
            close: 100.0,
            rsi,
            macd,
            macd_signal,
            macd_hist: macd - macd_signal,
            ma_short,
            ma_long,
        }
    }

    #[test]
    fn defaults_applied() {
        let p = params();
        assert_eq!(p.symbol, "BTCUSDT");
        assert_eq!(p.interval, "1h");
        assert_eq!(p.kline_limit, 100);
        assert_eq!((p.macd_fast, p.macd_slow, p.macd_signal), (12, 26, 9));
        assert_eq!((p.ma_short_period, p.ma_long_period), (9, 21));
    }

    #[test]
    fn bullish_crossover_with_confirmation_buys() {
        let p = params();
        let prev = row(99.0, 100.0, 0.1, 0.2, 50.0);
        let latest = row(101.0, 100.0, 0.5, 0.3, 55.0);
        assert_eq!(classify(&prev, &latest, &p), Signal::Buy);
    }

    #[test]
    fn overbought_rsi_blocks_buy() {
        let p = params();
        let prev = row(99.0, 100.0, 0.1, 0.2, 50.0);
        let latest = row(101.0, 100.0, 0.5, 0.3, 75.0);
        assert_eq!(classify(&prev, &latest, &p), Signal::Hold);
    }

    #[test]
    fn bearish_crossover_with_confirmation_sells() {
        let p = params();
        let prev = row(101.0, 100.0, 0.3, 0.2, 50.0);
        let latest = row(99.0, 100.0, -0.5, -0.1, 45.0);
        assert_eq!(classify(&prev, &latest, &p), Signal::Sell);
    }

    #[test]
    fn no_crossover_holds() {
        let p = params();
        let prev = row(101.0, 100.0, 0.5, 0.3, 50.0);
        let latest = row(102.0, 100.0, 0.6, 0.3, 50.0);
        assert_eq!(classify(&prev, &latest, &p), Signal::Hold);
    }

    #[test]
    fn invalid_periods_rejected() {
        let cfg = BotConfiguration::new(
            1,
            "momentum",
            json!({ "symbol": "BTCUSDT", "ma_short_period": 30, "ma_long_period": 21 }),
        );
        let p = crate::strategy::parse_settings::<MomentumParams>(&cfg).unwrap();
        assert!(matches!(p.validated(), Err(StrategyError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn too_few_candles_hold_with_diagnostic() {
        let gw = MockGateway::new();
        gw.set_candles("BTCUSDT", "1h", (0..20).map(|i| Candle::flat(i, 100.0)).collect());
        let eval = evaluate(&params(), &gw, MomentumState::default()).await;
        assert_eq!(eval.intents.len(), 1);
        assert_eq!(eval.intents[0].kind, IntentKind::Hold);
        assert!(eval.diagnostic.unwrap().contains("insufficient data"));
    }

    #[tokio::test]
    async fn evaluation_is_deterministic() {
        let gw = MockGateway::new();
        let candles: Vec<Candle> = (0..100)
            .map(|i| Candle::flat(i, 100.0 + (i as f64 * 0.3).sin() * 5.0))
            .collect();
        gw.set_candles("BTCUSDT", "1h", candles);
        let a = evaluate(&params(), &gw, MomentumState::default()).await;
        let b = evaluate(&params(), &gw, MomentumState::default()).await;
        assert_eq!(a, b);
        assert!(a.reference_price.is_some());
    }

    #[tokio::test]
    async fn gateway_failure_holds() {
        let gw = MockGateway::new();
        let eval = evaluate(&params(), &gw, MomentumState::default()).await;
        assert_eq!(eval.intents[0].kind, IntentKind::Hold);
        assert!(eval.diagnostic.is_some());
    }
}
