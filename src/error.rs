//! Error types for the order book.

use thiserror::Error;

use crate::registry::OrderId;

/// Everything a public book operation can fail with.
///
/// Validation always runs before any structural mutation, so a returned
/// error means the book is unchanged. `Internal` is the exception: it
/// reports a broken invariant and should be treated as a bug.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BookError {
    /// Order size must be a positive share count.
    #[error("size must be greater than zero")]
    InvalidSize,

    /// The price does not round to a tick inside [min_price, max_price].
    #[error("price {0} does not round to a valid tick inside the book")]
    InvalidPrice(f64),

    /// A price range with low > high, or a non-positive lower bound.
    #[error("invalid price range: low {low}, high {high}")]
    InvalidRange { low: f64, high: f64 },

    /// Depth queries require at least one level.
    #[error("invalid depth {0}: must be greater than zero")]
    InvalidDepth(usize),

    /// Depth query asked for more levels than the book holds ticks.
    #[error("depth {requested} exceeds the {available} ticks in the book")]
    DepthExceedsBook { requested: usize, available: usize },

    /// A grow operation that would not extend the book past its bound.
    #[error("grow bound {given} does not extend the book past {bound}")]
    InvalidGrow { given: f64, bound: f64 },

    /// Replace target does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// An invariant the engine relies on was violated.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}
