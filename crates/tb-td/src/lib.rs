//! # tb-td
//!
//! Exchange access and order execution.
//!
//! - [`binance`]: spot REST/WS implementation of [`ExchangeGateway`](tb_core::gateway::ExchangeGateway)
//! - [`rules`]: per-symbol trading-rules cache
//! - [`normalize`]: step/tick quantization
//! - [`executor`]: intent → order → trade record
//!
//! | Exchange | Module    | REST                     | Streams                    |
//! |----------|-----------|--------------------------|----------------------------|
//! | Binance  | `binance` | `/api/v3/*` (HMAC signed)| `<symbol>@ticker` over WS  |

pub mod binance;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod rules;

pub use binance::BinanceGateway;
pub use binance::config::BinanceConfig;
pub use error::ExecutionError;
pub use executor::{ExecutionOutcome, OrderExecutor};
pub use rules::RulesCache;
