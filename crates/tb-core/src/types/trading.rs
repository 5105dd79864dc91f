//! Trading data structures: intents, order requests/results and trade records.
//!
//! An intent flows from a signal engine to the executor, which turns it into
//! an [`OrderRequest`], reads back an [`OrderResult`] from the gateway and
//! finally emits a [`TradeRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bot::BotId;
use super::enums::{OrderStatus, OrderType, Side, TimeInForce, TradeAction};

// ---------------------------------------------------------------------------
// Trade intent (signal engine → scheduler → executor)
// ---------------------------------------------------------------------------

/// What a strategy wants to do this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentKind {
    Buy,
    Sell,
    Hold,
    DcaBuy,
    SmartDipBuy,
    TrailingStopSell,
    /// Buy at grid level `level` (index into the level list).
    GridBuy { level: usize },
    /// Sell at grid level `level`, closing the open buy held at `paired_level`.
    GridSell { level: usize, paired_level: usize },
}

impl IntentKind {
    /// Order side, or `None` for `Hold`.
    pub fn side(&self) -> Option<Side> {
        match self {
            Self::Buy | Self::DcaBuy | Self::SmartDipBuy | Self::GridBuy { .. } => Some(Side::Buy),
            Self::Sell | Self::TrailingStopSell | Self::GridSell { .. } => Some(Side::Sell),
            Self::Hold => None,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.side().is_some()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::DcaBuy => "DCA_BUY",
            Self::SmartDipBuy => "SMART_DIP_BUY",
            Self::TrailingStopSell => "TRAILING_STOP_SELL",
            Self::GridBuy { .. } => "GRID_BUY",
            Self::GridSell { .. } => "GRID_SELL",
        }
    }
}

/// Order size as chosen by the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sizing {
    /// Spend this much quote currency (`quoteOrderQty`).
    Quote(f64),
    /// Trade this much base currency.
    Base(f64),
}

/// A proposed action. Transient: never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    #[serde(flatten)]
    pub kind: IntentKind,
    pub symbol: String,
    pub sizing: Option<Sizing>,
    /// Price the strategy observed when deciding.
    pub reference_price: Option<f64>,
    pub order_type: OrderType,
    /// Required for `OrderType::Limit`.
    pub limit_price: Option<f64>,
    /// Human-readable explanation, mostly for HOLD.
    pub reason: Option<String>,
}

impl TradeIntent {
    pub fn hold(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Hold,
            symbol: symbol.into(),
            sizing: None,
            reference_price: None,
            order_type: OrderType::Market,
            limit_price: None,
            reason: Some(reason.into()),
        }
    }

    pub fn market(
        kind: IntentKind,
        symbol: impl Into<String>,
        sizing: Sizing,
        reference_price: Option<f64>,
    ) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            sizing: Some(sizing),
            reference_price,
            order_type: OrderType::Market,
            limit_price: None,
            reason: None,
        }
    }

    pub fn limit(kind: IntentKind, symbol: impl Into<String>, sizing: Sizing, price: f64) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            sizing: Some(sizing),
            reference_price: Some(price),
            order_type: OrderType::Limit,
            limit_price: Some(price),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_actionable(&self) -> bool {
        self.kind.is_actionable()
    }
}

// ---------------------------------------------------------------------------
// Order request / result (executor ↔ gateway)
// ---------------------------------------------------------------------------

/// Normalized order ready for submission.
///
/// Exactly one of `quantity` / `quote_order_qty` is set; `price` and
/// `time_in_force` are set only for LIMIT orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Option<f64>,
    pub quote_order_qty: Option<f64>,
    pub price: Option<f64>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market_quote(symbol: impl Into<String>, side: Side, quote: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity: None,
            quote_order_qty: Some(quote),
            price: None,
            time_in_force: None,
            client_order_id: None,
        }
    }

    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity: Some(quantity),
            quote_order_qty: None,
            price: None,
            time_in_force: None,
            client_order_id: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: Side, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity: Some(quantity),
            quote_order_qty: None,
            price: Some(price),
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: None,
        }
    }
}

/// One partial fill reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub qty: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub commission_asset: String,
}

/// Exchange acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub status: OrderStatus,
    pub executed_qty: f64,
    /// Order price (0 for MARKET orders).
    pub price: f64,
    pub cumulative_quote_qty: f64,
    pub fills: Vec<Fill>,
}

impl OrderResult {
    /// Realized average price: quantity-weighted over `fills` when present,
    /// else `cumulative_quote_qty / executed_qty`, else the order price.
    pub fn average_fill_price(&self) -> Option<f64> {
        let filled: f64 = self.fills.iter().map(|f| f.qty).sum();
        if filled > 0.0 {
            let cost: f64 = self.fills.iter().map(|f| f.price * f.qty).sum();
            return Some(cost / filled);
        }
        if self.executed_qty > 0.0 && self.cumulative_quote_qty > 0.0 {
            return Some(self.cumulative_quote_qty / self.executed_qty);
        }
        (self.price > 0.0).then_some(self.price)
    }

    /// Executed quantity, falling back to the sum of fills.
    pub fn filled_quantity(&self) -> f64 {
        if self.executed_qty > 0.0 {
            self.executed_qty
        } else {
            self.fills.iter().map(|f| f.qty).sum()
        }
    }
}

// ---------------------------------------------------------------------------
// Trade record (executor → store)
// ---------------------------------------------------------------------------

/// Durable, append-only fact that a fill happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub bot_id: BotId,
    pub symbol: String,
    pub action: TradeAction,
    /// Intent label that produced the trade, e.g. `"GRID_BUY"`.
    pub intent: String,
    pub price: f64,
    pub quantity: f64,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(fills: Vec<Fill>, executed: f64, cum_quote: f64) -> OrderResult {
        OrderResult {
            order_id: "1".into(),
            client_order_id: None,
            status: OrderStatus::Filled,
            executed_qty: executed,
            price: 0.0,
            cumulative_quote_qty: cum_quote,
            fills,
        }
    }

    fn fill(price: f64, qty: f64) -> Fill {
        Fill { price, qty, commission: 0.0, commission_asset: String::new() }
    }

    #[test]
    fn weighted_average_over_fills() {
        let r = result(vec![fill(100.0, 1.0), fill(110.0, 3.0)], 4.0, 430.0);
        let avg = r.average_fill_price().unwrap();
        assert!((avg - 107.5).abs() < 1e-9);
    }

    #[test]
    fn average_falls_back_to_cumulative_quote() {
        let r = result(vec![], 2.0, 201.0);
        assert!((r.average_fill_price().unwrap() - 100.5).abs() < 1e-9);
        assert!(result(vec![], 0.0, 0.0).average_fill_price().is_none());
    }

    #[test]
    fn intent_sides() {
        assert_eq!(IntentKind::GridSell { level: 2, paired_level: 1 }.side(), Some(Side::Sell));
        assert_eq!(IntentKind::SmartDipBuy.side(), Some(Side::Buy));
        assert!(!IntentKind::Hold.is_actionable());
        assert_eq!(IntentKind::TrailingStopSell.label(), "TRAILING_STOP_SELL");
    }

    #[test]
    fn intent_serializes_with_kind_tag() {
        let intent = TradeIntent::limit(
            IntentKind::GridBuy { level: 0 },
            "BTCUSDT",
            Sizing::Base(0.001),
            48000.0,
        );
        let v = serde_json::to_value(&intent).unwrap();
        assert_eq!(v["kind"], "GRID_BUY");
        assert_eq!(v["level"], 0);
        assert_eq!(v["order_type"], "LIMIT");
    }
}
