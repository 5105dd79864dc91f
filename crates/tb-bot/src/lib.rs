//! # tb-bot
//!
//! Strategy evaluation and scheduling.
//!
//! - [`indicators`]: RSI, MACD, SMA and EMA series over closing prices
//! - [`strategy`]: momentum, grid and DCA signal engines
//! - [`scheduler`]: periodic tick over all active bots, bot status
//! - [`performance`]: realized PnL from trade history

pub mod error;
pub mod indicators;
pub mod performance;
pub mod scheduler;
pub mod strategy;

pub use error::{SchedulerError, StrategyError};
pub use performance::{PerformanceMetrics, calculate_performance};
pub use scheduler::{BotScheduler, BotStatus, TickReport};
pub use strategy::{Evaluation, Strategy};
