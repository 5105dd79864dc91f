//! Signal engines.
//!
//! A [`Strategy`] is built from a stored [`BotConfiguration`] and evaluated
//! once per tick against live market data. Evaluation never fails: problems
//! (bad settings, missing data, gateway errors) degrade to a single HOLD
//! intent with a diagnostic so one bot cannot disturb the others.
//!
//! State handed to `evaluate` comes from the store; the returned state is
//! what the scheduler persists after executions have been folded in with
//! [`Strategy::apply_fill`].

pub mod dca;
pub mod grid;
pub mod momentum;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tb_core::gateway::ExchangeGateway;
use tb_core::{BotConfiguration, BotType, RuntimeState, TradeIntent, TradeRecord};
use tracing::warn;

use crate::error::StrategyError;

pub use dca::DcaParams;
pub use grid::GridParams;
pub use momentum::MomentumParams;

/// Output of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub intents: Vec<TradeIntent>,
    /// State after evaluation, before any fills are applied.
    pub state: RuntimeState,
    /// Last price the engine looked at, if it got that far.
    pub reference_price: Option<f64>,
    /// Why the engine held for a reason other than "no signal".
    pub diagnostic: Option<String>,
}

impl Evaluation {
    fn hold(symbol: &str, state: RuntimeState, diagnostic: String) -> Self {
        Self {
            intents: vec![TradeIntent::hold(symbol, diagnostic.clone())],
            state,
            reference_price: None,
            diagnostic: Some(diagnostic),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Momentum(MomentumParams),
    Grid(GridParams),
    Dca(DcaParams),
}

/// Deserialize the settings map into `T`, mapping any shape error.
pub(crate) fn parse_settings<T: DeserializeOwned>(config: &BotConfiguration) -> Result<T, StrategyError> {
    serde_json::from_value(config.settings_value())
        .map_err(|e| StrategyError::InvalidParameters(format!("bot {}: {e}", config.id)))
}

/// Settings `symbol`, trimmed and upper-cased.
pub(crate) fn deserialize_symbol<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = <String as serde::Deserialize>::deserialize(de)?;
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(serde::de::Error::custom("symbol must not be empty"));
    }
    Ok(symbol)
}

impl Strategy {
    pub fn from_config(config: &BotConfiguration) -> Result<Self, StrategyError> {
        let kind = config.kind().map_err(StrategyError::UnsupportedBotType)?;
        let strategy = match kind {
            BotType::Momentum => Self::Momentum(parse_settings::<MomentumParams>(config)?.validated()?),
            BotType::Grid => Self::Grid(parse_settings::<GridParams>(config)?.validated()?),
            BotType::Dca => Self::Dca(parse_settings::<DcaParams>(config)?.validated()?),
        };
        Ok(strategy)
    }

    pub fn bot_type(&self) -> BotType {
        match self {
            Self::Momentum(_) => BotType::Momentum,
            Self::Grid(_) => BotType::Grid,
            Self::Dca(_) => BotType::Dca,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Momentum(p) => &p.symbol,
            Self::Grid(p) => &p.symbol,
            Self::Dca(p) => &p.symbol,
        }
    }

    /// Stored state if it belongs to this strategy family, otherwise fresh.
    fn coerce_state(&self, stored: Option<RuntimeState>) -> RuntimeState {
        match stored {
            Some(state) if state.bot_type() == self.bot_type() => state,
            Some(state) => {
                warn!(
                    "[strategy] {} state found for {} bot on {}; starting fresh",
                    state.bot_type(),
                    self.bot_type(),
                    self.symbol()
                );
                RuntimeState::initial(self.bot_type())
            }
            None => RuntimeState::initial(self.bot_type()),
        }
    }

    pub async fn evaluate(
        &self,
        gateway: &dyn ExchangeGateway,
        stored: Option<RuntimeState>,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let state = self.coerce_state(stored);
        match (self, state) {
            (Self::Momentum(p), RuntimeState::Momentum(s)) => momentum::evaluate(p, gateway, s).await,
            (Self::Grid(p), RuntimeState::Grid(s)) => grid::evaluate(p, gateway, s).await,
            (Self::Dca(p), RuntimeState::Dca(s)) => dca::evaluate(p, gateway, s, now).await,
            (_, state) => Evaluation::hold(self.symbol(), state, "state does not match strategy".into()),
        }
    }

    /// Fold an executed intent into the runtime state.
    pub fn apply_fill(&self, state: &mut RuntimeState, intent: &TradeIntent, record: &TradeRecord) {
        match state {
            RuntimeState::Momentum(s) => momentum::apply_fill(s, intent, record),
            RuntimeState::Grid(s) => grid::apply_fill(s, intent, record),
            RuntimeState::Dca(s) => dca::apply_fill(s, intent, record),
        }
    }

    /// Note an order the exchange accepted but has not filled.
    pub fn apply_pending(&self, state: &mut RuntimeState, intent: &TradeIntent, order_id: &str, quantity: f64) {
        if let RuntimeState::Grid(s) = state {
            grid::apply_pending(s, intent, order_id, quantity);
        }
    }

    /// The exit for `intent` is too small to trade; drop the position it
    /// was meant to close. Returns whether anything was released.
    pub fn release_dust(&self, state: &mut RuntimeState, intent: &TradeIntent) -> bool {
        match state {
            RuntimeState::Dca(s) => dca::release_dust(s, intent),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tb_core::GridState;
    use tb_core::gateway::mock::MockGateway;

    #[test]
    fn unknown_bot_type_is_unsupported() {
        let cfg = BotConfiguration::new(1, "arbitrage", json!({ "symbol": "BTCUSDT" }));
        assert_eq!(
            Strategy::from_config(&cfg),
            Err(StrategyError::UnsupportedBotType("arbitrage".into()))
        );
    }

    #[test]
    fn bot_type_is_case_insensitive() {
        let cfg = BotConfiguration::new(
            1,
            "GRID",
            json!({ "symbol": "btcusdt", "upper_limit": 52000, "lower_limit": 48000, "num_grids": 5 }),
        );
        let s = Strategy::from_config(&cfg).unwrap();
        assert_eq!(s.bot_type(), BotType::Grid);
        assert_eq!(s.symbol(), "BTCUSDT");
    }

    #[tokio::test]
    async fn mismatched_state_is_replaced() {
        let gw = MockGateway::new();
        gw.set_ticker("ETHUSDT", 3000.0);
        let cfg = BotConfiguration::new(
            2,
            "dca",
            json!({ "symbol": "ETHUSDT", "investment_amount": 20.0, "frequency": "daily" }),
        );
        let s = Strategy::from_config(&cfg).unwrap();
        let eval = s.evaluate(&gw, Some(RuntimeState::Grid(GridState::default())), Utc::now()).await;
        assert_eq!(eval.state.bot_type(), BotType::Dca);
    }
}
