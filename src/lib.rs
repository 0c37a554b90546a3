//! # Matchbook
//!
//! A single-instrument, in-memory limit order book and matching engine.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread (or one coarse lock) owns a book; every
//!   operation is synchronous and runs to completion
//! - **Integer ticks**: prices index a dense level vector; floats only
//!   cross the public boundary
//! - **O(1) book mutation**: insert, cancel, and per-fill maintenance are
//!   constant time via arena-backed intrusive chains
//! - **Deferred callbacks**: structural mutation fully quiesces before any
//!   owner callback fires, and callbacks may reenter the book
//!
//! ## Architecture
//!
//! ```text
//! [public operation] -> [tick validation] -> [matching + stop sweep]
//!                                                    |
//!                               [journal + deferred callback drain]
//! ```
//!
//! Four order kinds are supported: limit, market, stop, and stop-limit.
//! Stops rest in per-tick trigger chains and are promoted (to market or
//! limit orders) by the first trade at or through their trigger, inside
//! the same top-level call that produced the trade.

pub mod arena;
pub mod error;
pub mod events;
pub mod journal;
mod matching;
pub mod order_book;
pub mod price_level;
pub mod registry;
pub mod tick;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use error::BookError;
pub use events::{CallbackMsg, OrderCallback, OrderKind, Side, SideOfMarket};
pub use journal::TimeSale;
pub use order_book::OrderBook;
pub use price_level::{Chain, PriceLevel};
pub use registry::{OrderId, OrderRegistry};
pub use tick::{TickKind, TickLadder};
