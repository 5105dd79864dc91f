//! Grid trading between two price bounds.
//!
//! `num_grids` levels are spaced evenly from `lower_limit` to `upper_limit`.
//! Each evaluation compares the current price with the previous one:
//!
//! - falling through levels: one LIMIT buy at the lowest crossed level that
//!   holds no open buy
//! - rising through level `i`: a LIMIT sell at level `i` for every open buy
//!   held at level `i - 1`
//!
//! The open-buy ledger changes when an order fills. An order the exchange
//! accepted without filling is kept as pending and occupies its level, so
//! the next crossing does not place a second one. A rejected order leaves
//! no trace and is retried on the next crossing.

use serde::Deserialize;
use tb_core::gateway::ExchangeGateway;
use tb_core::{GridState, IntentKind, PendingGridOrder, RuntimeState, Side, Sizing, TradeIntent, TradeRecord};
use tracing::debug;

use super::Evaluation;
use crate::error::StrategyError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridParams {
    #[serde(deserialize_with = "crate::strategy::deserialize_symbol")]
    pub symbol: String,
    pub upper_limit: f64,
    pub lower_limit: f64,
    pub num_grids: usize,
    /// Quote amount committed per level.
    #[serde(default = "default_investment_per_grid")]
    pub investment_per_grid: f64,
}

fn default_investment_per_grid() -> f64 {
    10.0
}

impl GridParams {
    pub fn validated(self) -> Result<Self, StrategyError> {
        let finite = self.upper_limit.is_finite() && self.lower_limit.is_finite();
        if !finite || self.lower_limit <= 0.0 || self.upper_limit <= self.lower_limit {
            return Err(StrategyError::InvalidParameters(format!(
                "grid bounds must satisfy 0 < lower ({}) < upper ({})",
                self.lower_limit, self.upper_limit
            )));
        }
        if self.num_grids < 2 {
            return Err(StrategyError::InvalidParameters(format!(
                "num_grids must be at least 2, got {}",
                self.num_grids
            )));
        }
        if !(self.investment_per_grid.is_finite() && self.investment_per_grid > 0.0) {
            return Err(StrategyError::InvalidParameters(format!(
                "investment_per_grid must be positive, got {}",
                self.investment_per_grid
            )));
        }
        Ok(self)
    }

    /// Evenly spaced levels, lowest first, both bounds included.
    pub fn levels(&self) -> Vec<f64> {
        let step = (self.upper_limit - self.lower_limit) / (self.num_grids - 1) as f64;
        (0..self.num_grids)
            .map(|i| {
                if i + 1 == self.num_grids {
                    self.upper_limit
                } else {
                    self.lower_limit + step * i as f64
                }
            })
            .collect()
    }
}

/// Intents for a move from `prev` to `price`. A missing `prev` counts as a
/// move down from above the grid.
pub fn decide(p: &GridParams, levels: &[f64], prev: Option<f64>, price: f64, ledger: &GridState) -> Vec<TradeIntent> {
    let mut intents = Vec::new();
    let prev_or_top = prev.unwrap_or(f64::INFINITY);

    if price < prev_or_top {
        let buy_level = levels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| price < l && l <= prev_or_top)
            .find(|&(i, _)| !ledger.has_open_buy(i));
        if let Some((i, &level_price)) = buy_level {
            intents.push(
                TradeIntent::limit(
                    IntentKind::GridBuy { level: i },
                    &p.symbol,
                    Sizing::Base(p.investment_per_grid / level_price),
                    level_price,
                )
                .with_reason(format!("price {price} fell through level {i} ({level_price})")),
            );
        }
    }

    if let Some(prev) = prev.filter(|&prev| price > prev) {
        for (i, &level_price) in levels.iter().enumerate().skip(1) {
            if !(prev < level_price && level_price <= price) {
                continue;
            }
            if let Some(open) = ledger.sellable(i - 1) {
                intents.push(
                    TradeIntent::limit(
                        IntentKind::GridSell { level: i, paired_level: i - 1 },
                        &p.symbol,
                        Sizing::Base(open.quantity),
                        level_price,
                    )
                    .with_reason(format!("price {price} rose through level {i} ({level_price})")),
                );
            }
        }
    }

    intents
}

pub(super) async fn evaluate(p: &GridParams, gateway: &dyn ExchangeGateway, mut state: GridState) -> Evaluation {
    let price = match gateway.get_ticker(&p.symbol).await {
        Ok(price) => price,
        Err(e) => return Evaluation::hold(&p.symbol, RuntimeState::Grid(state), format!("ticker unavailable: {e}")),
    };

    let levels = p.levels();
    let mut intents = decide(p, &levels, state.last_price, price, &state);
    debug!(
        "[grid] {} prev={:?} price={price} open_buys={} intents={}",
        p.symbol,
        state.last_price,
        state.open_buys.len(),
        intents.len()
    );
    state.last_price = Some(price);

    if intents.is_empty() {
        intents.push(TradeIntent::hold(&p.symbol, "no grid level crossed"));
    }
    Evaluation {
        intents,
        state: RuntimeState::Grid(state),
        reference_price: Some(price),
        diagnostic: None,
    }
}

pub(super) fn apply_fill(state: &mut GridState, intent: &TradeIntent, record: &TradeRecord) {
    match intent.kind {
        IntentKind::GridBuy { level } => state.open(level, record.price, record.quantity),
        IntentKind::GridSell { paired_level, .. } => {
            if let Some(left) = state.reduce(paired_level, record.quantity).filter(|q| *q > 0.0) {
                debug!("[grid] level {paired_level} partly sold, {left} still open");
            }
        }
        _ => {}
    }
}

pub(super) fn apply_pending(state: &mut GridState, intent: &TradeIntent, order_id: &str, quantity: f64) {
    let (level, side) = match intent.kind {
        IntentKind::GridBuy { level } => (level, Side::Buy),
        IntentKind::GridSell { paired_level, .. } => (paired_level, Side::Sell),
        _ => return,
    };
    state.add_pending(PendingGridOrder { level, side, order_id: order_id.to_string(), quantity });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tb_core::BotConfiguration;
    use tb_core::gateway::mock::MockGateway;

    fn params() -> GridParams {
        GridParams {
            symbol: "BTCUSDT".into(),
            upper_limit: 52000.0,
            lower_limit: 48000.0,
            num_grids: 5,
            investment_per_grid: 100.0,
        }
    }

    #[test]
    fn levels_are_evenly_spaced() {
        assert_eq!(params().levels(), vec![48000.0, 49000.0, 50000.0, 51000.0, 52000.0]);
    }

    #[test]
    fn first_drop_below_grid_buys_lowest_level() {
        let p = params();
        let intents = decide(&p, &p.levels(), None, 47500.0, &GridState::default());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, IntentKind::GridBuy { level: 0 });
        assert_eq!(intents[0].limit_price, Some(48000.0));
    }

    #[test]
    fn rise_sells_against_open_buy_below() {
        let p = params();
        let mut ledger = GridState::default();
        ledger.open(0, 48000.0, 0.002);
        let intents = decide(&p, &p.levels(), Some(47500.0), 49500.0, &ledger);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, IntentKind::GridSell { level: 1, paired_level: 0 });
        assert_eq!(intents[0].limit_price, Some(49000.0));
        assert_eq!(intents[0].sizing, Some(Sizing::Base(0.002)));
    }

    #[test]
    fn no_duplicate_buy_on_held_level() {
        let p = params();
        let mut ledger = GridState::default();
        ledger.open(2, 50000.0, 0.002);
        let intents = decide(&p, &p.levels(), Some(50500.0), 49800.0, &ledger);
        assert!(intents.is_empty());
    }

    #[test]
    fn working_orders_block_repeats() {
        let p = params();
        let levels = p.levels();
        let mut ledger = GridState::default();
        let buy = decide(&p, &levels, None, 47500.0, &ledger).remove(0);
        apply_pending(&mut ledger, &buy, "11", 0.00208);
        assert!(decide(&p, &levels, Some(48500.0), 47500.0, &ledger).is_empty());

        ledger.open(0, 48000.0, 0.002);
        let sell = decide(&p, &levels, Some(47500.0), 49500.0, &ledger).remove(0);
        apply_pending(&mut ledger, &sell, "12", 0.002);
        assert!(decide(&p, &levels, Some(48500.0), 49500.0, &ledger).is_empty());
    }

    #[test]
    fn partial_sell_fill_keeps_remainder_open() {
        let mut ledger = GridState::default();
        ledger.open(0, 48000.0, 0.002);
        let sell = TradeIntent::limit(
            IntentKind::GridSell { level: 1, paired_level: 0 },
            "BTCUSDT",
            Sizing::Base(0.002),
            49000.0,
        );
        let record = TradeRecord {
            id: uuid::Uuid::new_v4(),
            bot_id: 1,
            symbol: "BTCUSDT".into(),
            action: tb_core::TradeAction::Sell,
            intent: "GRID_SELL".into(),
            price: 49000.0,
            quantity: 0.001,
            order_id: Some("9".into()),
            timestamp: chrono::Utc::now(),
        };
        apply_fill(&mut ledger, &sell, &record);
        assert_eq!(ledger.open_buy(0).map(|p| p.quantity), Some(0.001));

        apply_fill(&mut ledger, &sell, &record);
        assert!(ledger.open_buys.is_empty());
    }

    #[test]
    fn flat_price_does_nothing() {
        let p = params();
        assert!(decide(&p, &p.levels(), Some(49500.0), 49500.0, &GridState::default()).is_empty());
    }

    #[test]
    fn bad_bounds_rejected() {
        let cfg = BotConfiguration::new(
            1,
            "grid",
            json!({ "symbol": "BTCUSDT", "upper_limit": 100, "lower_limit": 200, "num_grids": 5 }),
        );
        let p = crate::strategy::parse_settings::<GridParams>(&cfg).unwrap();
        assert!(matches!(p.validated(), Err(StrategyError::InvalidParameters(_))));

        let cfg = BotConfiguration::new(
            1,
            "grid",
            json!({ "symbol": "BTCUSDT", "upper_limit": "high", "lower_limit": 200, "num_grids": 5 }),
        );
        assert!(matches!(
            crate::strategy::parse_settings::<GridParams>(&cfg),
            Err(StrategyError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn evaluation_tracks_last_price_without_touching_ledger() {
        let gw = MockGateway::new();
        gw.set_ticker("BTCUSDT", 47500.0);
        let eval = evaluate(&params(), &gw, GridState::default()).await;
        assert_eq!(eval.intents[0].kind, IntentKind::GridBuy { level: 0 });
        match eval.state {
            RuntimeState::Grid(g) => {
                assert_eq!(g.last_price, Some(47500.0));
                assert!(g.open_buys.is_empty());
            }
            other => panic!("unexpected state {other:?}"),
        }
    }
}
