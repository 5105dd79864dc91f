//! # tb-md
//!
//! Market-data fan-out: one upstream price stream per symbol shared by any
//! number of local subscribers, plus a WebSocket relay exposing those
//! subscriptions to external clients.
//!
//! ```text
//! exchange stream ──► listener task (per symbol) ──► subscriber queues
//!                                                    └─► relay connections
//! ```

pub mod fanout;
pub mod relay;

pub use fanout::{MarketDataHub, Subscription, SubscriptionHandle};
pub use relay::RelayServer;
