//! Dollar-cost averaging with an optional dip accelerator and trailing stop.
//!
//! Order of checks on each evaluation:
//! 1. trailing stop on an open position (sells everything and stops there)
//! 2. scheduled buy when the cadence is due
//! 3. smart-dip buy when price trades far enough below its daily average
//!
//! A percentage of zero disables the corresponding feature.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tb_core::gateway::ExchangeGateway;
use tb_core::{DcaState, Frequency, IntentKind, MaType, RuntimeState, Sizing, TradeIntent, TradeRecord};
use tracing::debug;

use super::Evaluation;
use crate::error::StrategyError;
use crate::indicators;

const DIP_INTERVAL: &str = "1d";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DcaParams {
    #[serde(deserialize_with = "crate::strategy::deserialize_symbol")]
    pub symbol: String,
    pub investment_amount: f64,
    pub frequency: Frequency,
    #[serde(default)]
    pub smart_dip_pct: Option<f64>,
    #[serde(default = "default_dip_ma_period")]
    pub smart_dip_ma_period: usize,
    #[serde(default)]
    pub smart_dip_ma_type: MaType,
    #[serde(default = "default_dip_multiplier")]
    pub smart_dip_multiplier: f64,
    #[serde(default)]
    pub trailing_stop_pct: Option<f64>,
}

fn default_dip_ma_period() -> usize {
    20
}
fn default_dip_multiplier() -> f64 {
    1.0
}

impl DcaParams {
    pub fn validated(self) -> Result<Self, StrategyError> {
        if !(self.investment_amount.is_finite() && self.investment_amount > 0.0) {
            return Err(StrategyError::InvalidParameters(format!(
                "investment_amount must be positive, got {}",
                self.investment_amount
            )));
        }
        let pct_ok = |p: Option<f64>| p.is_none_or(|v| v.is_finite() && (0.0..100.0).contains(&v));
        if !pct_ok(self.smart_dip_pct) || !pct_ok(self.trailing_stop_pct) {
            return Err(StrategyError::InvalidParameters(
                "smart_dip_pct and trailing_stop_pct must be within [0, 100)".into(),
            ));
        }
        if self.smart_dip_ma_period == 0 || self.smart_dip_multiplier <= 0.0 {
            return Err(StrategyError::InvalidParameters(
                "smart_dip_ma_period and smart_dip_multiplier must be positive".into(),
            ));
        }
        Ok(self)
    }
}

/// True when no investment was made yet or a full period has elapsed.
pub fn should_invest_now(frequency: Frequency, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(last) => now >= last + frequency.period(),
    }
}

/// Stop price for an open position, if a trailing stop applies.
pub fn trailing_stop_price(p: &DcaParams, state: &DcaState) -> Option<f64> {
    let pct = p.trailing_stop_pct.filter(|v| *v > 0.0)?;
    let active = state.position_active
        && state.average_purchase_price > 0.0
        && state.highest_price_since_purchase > 0.0;
    active.then(|| state.highest_price_since_purchase * (1.0 - pct / 100.0))
}

async fn dip_threshold(p: &DcaParams, gateway: &dyn ExchangeGateway, pct: f64) -> Result<f64, String> {
    let limit = p.smart_dip_ma_period + 5;
    let candles = gateway
        .get_candles(&p.symbol, DIP_INTERVAL, limit, None, None)
        .await
        .map_err(|e| format!("dip candles unavailable: {e}"))?;
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let series = match p.smart_dip_ma_type {
        MaType::Sma => indicators::sma(&closes, p.smart_dip_ma_period),
        MaType::Ema => indicators::ema(&closes, p.smart_dip_ma_period),
    }
    .map_err(|e| e.to_string())?;
    let ma = indicators::last_value(&series)
        .ok_or_else(|| format!("not enough daily candles for MA({})", p.smart_dip_ma_period))?;
    Ok(ma * (1.0 - pct / 100.0))
}

pub(super) async fn evaluate(
    p: &DcaParams,
    gateway: &dyn ExchangeGateway,
    mut state: DcaState,
    now: DateTime<Utc>,
) -> Evaluation {
    let price = match gateway.get_ticker(&p.symbol).await {
        Ok(price) => price,
        Err(e) => return Evaluation::hold(&p.symbol, RuntimeState::Dca(state), format!("ticker unavailable: {e}")),
    };

    if let Some(stop) = trailing_stop_price(p, &state) {
        if price < stop {
            let intent = TradeIntent::market(
                IntentKind::TrailingStopSell,
                &p.symbol,
                Sizing::Base(state.position_quantity),
                Some(price),
            )
            .with_reason(format!(
                "price {price} below stop {stop:.2} (high {})",
                state.highest_price_since_purchase
            ));
            return Evaluation {
                intents: vec![intent],
                state: RuntimeState::Dca(state),
                reference_price: Some(price),
                diagnostic: None,
            };
        }
    }

    if state.position_active && price > state.highest_price_since_purchase {
        state.highest_price_since_purchase = price;
    }

    let mut diagnostic = None;
    let intent = if should_invest_now(p.frequency, state.last_investment_time, now) {
        Some(TradeIntent::market(IntentKind::DcaBuy, &p.symbol, Sizing::Quote(p.investment_amount), Some(price)))
    } else if let Some(pct) = p.smart_dip_pct.filter(|v| *v > 0.0) {
        match dip_threshold(p, gateway, pct).await {
            Ok(threshold) if price < threshold => Some(
                TradeIntent::market(
                    IntentKind::SmartDipBuy,
                    &p.symbol,
                    Sizing::Quote(p.investment_amount * p.smart_dip_multiplier),
                    Some(price),
                )
                .with_reason(format!("price {price} below dip threshold {threshold:.2}")),
            ),
            Ok(_) => None,
            Err(msg) => {
                diagnostic = Some(msg);
                None
            }
        }
    } else {
        None
    };
    debug!("[dca] {} price={price} active={} -> {:?}", p.symbol, state.position_active, intent.as_ref().map(|i| i.kind.label()));

    let intent = intent.unwrap_or_else(|| {
        TradeIntent::hold(&p.symbol, diagnostic.clone().unwrap_or_else(|| "no investment due".into()))
    });
    Evaluation {
        intents: vec![intent],
        state: RuntimeState::Dca(state),
        reference_price: Some(price),
        diagnostic,
    }
}

pub(super) fn apply_fill(state: &mut DcaState, intent: &TradeIntent, record: &TradeRecord) {
    match intent.kind {
        IntentKind::DcaBuy => {
            state.record_buy(record.price, record.quantity);
            state.last_investment_time = Some(record.timestamp);
        }
        IntentKind::SmartDipBuy => state.record_buy(record.price, record.quantity),
        IntentKind::TrailingStopSell => state.reset_position(),
        _ => {}
    }
}

pub(super) fn release_dust(state: &mut DcaState, intent: &TradeIntent) -> bool {
    if intent.kind != IntentKind::TrailingStopSell || !state.position_active {
        return false;
    }
    state.reset_position();
    true
}
