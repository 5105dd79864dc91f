//! Indicator series over closing prices, computed with the `ta` crate.
//!
//! Every function returns one entry per input value. Entries inside the
//! warm-up window are `None` so callers can drop incomplete rows.

use ta::Next;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};

use crate::error::StrategyError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

fn invalid(name: &str, e: ta::errors::TaError) -> StrategyError {
    StrategyError::Indicator(format!("{name}: {e:?}"))
}

/// RSI; ready once more than `period` values have been seen.
pub fn rsi(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut ind = RelativeStrengthIndex::new(period).map_err(|e| invalid("RSI", e))?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let out = ind.next(v);
            (i + 1 > period).then_some(out)
        })
        .collect())
}

pub fn sma(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut ind = SimpleMovingAverage::new(period).map_err(|e| invalid("SMA", e))?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let out = ind.next(v);
            (i + 1 >= period).then_some(out)
        })
        .collect())
}

pub fn ema(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut ind = ExponentialMovingAverage::new(period).map_err(|e| invalid("EMA", e))?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let out = ind.next(v);
            (i + 1 >= period).then_some(out)
        })
        .collect())
}

/// MACD; the signal line is complete after `slow + signal - 1` values.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<Vec<Option<MacdPoint>>, StrategyError> {
    if fast >= slow {
        return Err(StrategyError::Indicator(format!("MACD fast ({fast}) must be below slow ({slow})")));
    }
    let mut ind =
        MovingAverageConvergenceDivergence::new(fast, slow, signal).map_err(|e| invalid("MACD", e))?;
    let warmup = slow + signal - 1;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let out = ind.next(v);
            (i + 1 >= warmup).then_some(MacdPoint {
                macd: out.macd,
                signal: out.signal,
                histogram: out.histogram,
            })
        })
        .collect())
}

/// Last complete value of a series.
pub fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.iter().rev().find_map(|v| *v)
}
