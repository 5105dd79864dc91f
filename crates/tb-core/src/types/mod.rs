//! Domain types shared by every crate in the workspace.
//!
//! - [`enums`]: sides, order types, statuses, bot kinds, cadences
//! - [`bot`]: bot configuration rows as read from the store
//! - [`market`]: candles, price ticks, symbol trading rules
//! - [`trading`]: intents, order requests/results, trade records
//! - [`state`]: per-bot runtime state carried between ticks

pub mod bot;
pub mod enums;
pub mod market;
pub mod state;
pub mod trading;

pub use bot::*;
pub use enums::*;
pub use market::*;
pub use state::*;
pub use trading::*;
