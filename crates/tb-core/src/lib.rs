//! # tb-core
//!
//! Shared foundation for the trading bot workspace:
//!
//! - **Types** (`types`): bot configurations, market data, intents, orders, runtime state
//! - **Gateway** (`gateway`): the `ExchangeGateway` trait (plus a scripted mock behind `mock`)
//! - **Store** (`store`): the `BotStore` trait with in-memory and JSON-file implementations
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): typed errors via thiserror
//! - **WebSocket** (`ws`): connect helper
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod store;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
