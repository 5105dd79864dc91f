//! Per-bot runtime state, persisted by the store between scheduler ticks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{BotType, Side};

/// Strategy-specific state carried from one tick to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum RuntimeState {
    Momentum(MomentumState),
    Grid(GridState),
    Dca(DcaState),
}

impl RuntimeState {
    /// Empty state for a freshly configured bot.
    pub fn initial(bot_type: BotType) -> Self {
        match bot_type {
            BotType::Momentum => Self::Momentum(MomentumState::default()),
            BotType::Grid => Self::Grid(GridState::default()),
            BotType::Dca => Self::Dca(DcaState::default()),
        }
    }

    pub fn bot_type(&self) -> BotType {
        match self {
            Self::Momentum(_) => BotType::Momentum,
            Self::Grid(_) => BotType::Grid,
            Self::Dca(_) => BotType::Dca,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentumState {
    /// Side of the last executed momentum trade.
    pub last_action: Option<Side>,
    /// Base quantity bought and not yet sold.
    pub position_quantity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DcaState {
    pub last_investment_time: Option<DateTime<Utc>>,
    pub average_purchase_price: f64,
    /// Trailing-stop high-water mark.
    pub highest_price_since_purchase: f64,
    pub position_quantity: f64,
    pub position_active: bool,
    pub total_invested: f64,
}

impl DcaState {
    /// Fold a buy fill into the running position.
    pub fn record_buy(&mut self, price: f64, quantity: f64) {
        let total_qty = self.position_quantity + quantity;
        if total_qty > 0.0 {
            self.average_purchase_price =
                (self.average_purchase_price * self.position_quantity + price * quantity) / total_qty;
        }
        self.position_quantity = total_qty;
        self.total_invested += price * quantity;
        self.position_active = self.position_quantity > 0.0;
        self.highest_price_since_purchase = self.highest_price_since_purchase.max(price);
    }

    /// Position closed; keeps `last_investment_time` so the cadence continues.
    pub fn reset_position(&mut self) {
        self.average_purchase_price = 0.0;
        self.highest_price_since_purchase = 0.0;
        self.position_quantity = 0.0;
        self.position_active = false;
        self.total_invested = 0.0;
    }
}

/// An open grid buy waiting for its paired sell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPosition {
    pub level: usize,
    pub price: f64,
    pub quantity: f64,
}

/// A grid order the exchange accepted but has not filled yet.
///
/// `level` is the ledger level the order occupies: the buy level for a buy,
/// the paired buy level for a sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingGridOrder {
    pub level: usize,
    pub side: Side,
    pub order_id: String,
    pub quantity: f64,
}

/// Remaining quantities at or below this are treated as fully closed.
const GRID_QTY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    /// Level ledger, sorted by level.
    pub open_buys: Vec<GridPosition>,
    /// Orders working on the exchange, one per level and side at most.
    #[serde(default)]
    pub pending_orders: Vec<PendingGridOrder>,
    /// Price seen on the previous evaluation.
    pub last_price: Option<f64>,
}

impl GridState {
    pub fn open_buy(&self, level: usize) -> Option<&GridPosition> {
        self.open_buys.iter().find(|p| p.level == level)
    }

    pub fn pending(&self, level: usize, side: Side) -> Option<&PendingGridOrder> {
        self.pending_orders.iter().find(|o| o.level == level && o.side == side)
    }

    /// Level holds a filled buy or a buy still working on the exchange.
    pub fn has_open_buy(&self, level: usize) -> bool {
        self.open_buy(level).is_some() || self.pending(level, Side::Buy).is_some()
    }

    /// Filled buy at `level` that has no sell working against it yet.
    pub fn sellable(&self, level: usize) -> Option<&GridPosition> {
        self.open_buy(level).filter(|_| self.pending(level, Side::Sell).is_none())
    }

    pub fn add_pending(&mut self, order: PendingGridOrder) {
        self.pending_orders.retain(|o| !(o.level == order.level && o.side == order.side));
        self.pending_orders.push(order);
        self.pending_orders.sort_by_key(|o| o.level);
    }

    /// Reduce the open buy at `level` by a sold quantity, closing it when
    /// nothing is left. Returns the remaining quantity.
    pub fn reduce(&mut self, level: usize, quantity: f64) -> Option<f64> {
        let idx = self.open_buys.iter().position(|p| p.level == level)?;
        let remaining = self.open_buys[idx].quantity - quantity;
        if remaining <= GRID_QTY_EPSILON {
            self.open_buys.remove(idx);
            Some(0.0)
        } else {
            self.open_buys[idx].quantity = remaining;
            Some(remaining)
        }
    }

    pub fn open(&mut self, level: usize, price: f64, quantity: f64) {
        match self.open_buys.iter_mut().find(|p| p.level == level) {
            Some(pos) => {
                let total = pos.quantity + quantity;
                if total > 0.0 {
                    pos.price = (pos.price * pos.quantity + price * quantity) / total;
                }
                pos.quantity = total;
            }
            None => {
                self.open_buys.push(GridPosition { level, price, quantity });
                self.open_buys.sort_by_key(|p| p.level);
            }
        }
    }

}
