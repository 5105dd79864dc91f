//! Enumerations shared by the strategy, execution and market-data layers.
//!
//! Wire names follow Binance spot conventions (`BUY`, `MARKET`, `FILLED`, ...)
//! so that the same enums serialize straight into order requests and trade
//! records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bot kinds
// ---------------------------------------------------------------------------

/// The closed set of strategy families a bot configuration can select.
///
/// Configurations carry the type as a free-form string (it comes from an
/// external store), so parsing goes through [`FromStr`] and an unknown value is
/// reported per bot rather than failing the whole configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotType {
    Momentum,
    Grid,
    Dca,
}

impl fmt::Display for BotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Momentum => write!(f, "momentum"),
            Self::Grid => write!(f, "grid"),
            Self::Dca => write!(f, "dca"),
        }
    }
}

impl FromStr for BotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "momentum" => Ok(Self::Momentum),
            "grid" => Ok(Self::Grid),
            "dca" => Ok(Self::Dca),
            other => Err(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Order / trading enums
// ---------------------------------------------------------------------------

/// Buy or sell direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type supported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
        }
    }
}

/// Time-in-force attached to LIMIT orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
        }
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    PendingCancel,
}

impl OrderStatus {
    /// Map a Binance status string. Unknown values are treated as `New`.
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "NEW" => Self::New,
            "PARTIALLY_FILLED" => Self::PartiallyFilled,
            "FILLED" => Self::Filled,
            "CANCELED" => Self::Canceled,
            "REJECTED" => Self::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => Self::Expired,
            "PENDING_CANCEL" => Self::PendingCancel,
            _ => Self::New,
        }
    }
}

/// Action written to a trade record.
///
/// `Sim*` variants mark fills produced by the simulated executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
    SimBuy,
    SimSell,
}

impl TradeAction {
    pub fn new(side: Side, simulated: bool) -> Self {
        match (side, simulated) {
            (Side::Buy, false) => Self::Buy,
            (Side::Sell, false) => Self::Sell,
            (Side::Buy, true) => Self::SimBuy,
            (Side::Sell, true) => Self::SimSell,
        }
    }

    pub fn side(self) -> Side {
        match self {
            Self::Buy | Self::SimBuy => Side::Buy,
            Self::Sell | Self::SimSell => Side::Sell,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy parameters
// ---------------------------------------------------------------------------

/// DCA investment cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn period(self) -> chrono::TimeDelta {
        match self {
            Self::Hourly => chrono::TimeDelta::hours(1),
            Self::Daily => chrono::TimeDelta::days(1),
            Self::Weekly => chrono::TimeDelta::weeks(1),
        }
    }
}

/// Moving-average flavour for the DCA smart-dip check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum MaType {
    #[default]
    Sma,
    Ema,
}

impl FromStr for MaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sma" => Ok(Self::Sma),
            "ema" => Ok(Self::Ema),
            other => Err(format!("unknown moving average type `{other}`")),
        }
    }
}

impl TryFrom<String> for MaType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_type_parsing_is_case_insensitive() {
        assert_eq!("Momentum".parse::<BotType>(), Ok(BotType::Momentum));
        assert_eq!(" grid ".parse::<BotType>(), Ok(BotType::Grid));
        assert_eq!("DCA".parse::<BotType>(), Ok(BotType::Dca));
        assert_eq!("arbitrage".parse::<BotType>(), Err("arbitrage".to_string()));
    }

    #[test]
    fn ma_type_accepts_any_case() {
        assert_eq!(serde_json::from_str::<MaType>(r#""EMA""#).unwrap(), MaType::Ema);
        assert_eq!(serde_json::from_str::<MaType>(r#""Sma""#).unwrap(), MaType::Sma);
        assert!(serde_json::from_str::<MaType>(r#""wma""#).is_err());
        assert_eq!(serde_json::to_string(&MaType::Ema).unwrap(), r#""ema""#);
    }

    #[test]
    fn order_status_mapping() {
        assert_eq!(OrderStatus::from_exchange("FILLED"), OrderStatus::Filled);
        assert_eq!(OrderStatus::from_exchange("EXPIRED_IN_MATCH"), OrderStatus::Expired);
        assert_eq!(OrderStatus::from_exchange("SOMETHING"), OrderStatus::New);
    }

    #[test]
    fn trade_action_wire_names() {
        let json = serde_json::to_string(&TradeAction::SimBuy).unwrap();
        assert_eq!(json, "\"SIM_BUY\"");
        assert_eq!(TradeAction::new(Side::Sell, false), TradeAction::Sell);
        assert_eq!(TradeAction::SimSell.side(), Side::Sell);
    }
}
