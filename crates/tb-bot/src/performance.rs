//! Realized performance from a bot's trade history.
//!
//! Trades are paired sequentially: a buy opens a cycle and the next sell
//! closes it. Sells with no open buy and buys never followed by a sell are
//! ignored. Simulated actions count the same as live ones.

use serde::Serialize;
use tb_core::{Side, TradeRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// Cycles that ended in a gain or a loss.
    pub total_trades_cycles: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage, 2 decimals.
    pub win_rate: f64,
    /// Quote units, 4 decimals.
    pub total_pnl: f64,
    pub average_pnl_per_cycle: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn calculate_performance(trades: &[TradeRecord]) -> PerformanceMetrics {
    let mut open: Option<(f64, f64)> = None;
    let mut wins = 0usize;
    let mut losses = 0usize;
    let mut total_pnl = 0.0;

    for trade in trades {
        match trade.action.side() {
            Side::Buy => open = Some((trade.price, trade.quantity)),
            Side::Sell => {
                let Some((buy_price, buy_qty)) = open.take() else {
                    continue;
                };
                let pnl = (trade.price - buy_price) * buy_qty;
                total_pnl += pnl;
                if pnl > 0.0 {
                    wins += 1;
                } else if pnl < 0.0 {
                    losses += 1;
                }
            }
        }
    }

    let cycles = wins + losses;
    if cycles == 0 {
        return PerformanceMetrics::default();
    }
    PerformanceMetrics {
        total_trades_cycles: cycles,
        winning_trades: wins,
        losing_trades: losses,
        win_rate: round_to(wins as f64 / cycles as f64 * 100.0, 2),
        total_pnl: round_to(total_pnl, 4),
        average_pnl_per_cycle: round_to(total_pnl / cycles as f64, 4),
    }
}
