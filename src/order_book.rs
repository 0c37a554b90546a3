//! Order book - dense per-tick storage and the public operation surface.
//!
//! The book owns a contiguous vector of price levels indexed by tick,
//! cached inside-market pointers, the order registry, the time-and-sales
//! journal, and the deferred notification queue. Matching and stop
//! trigger logic live in `matching`.
//!
//! Every operation on one book is synchronous and runs to completion;
//! a book instance is meant to be driven from a single thread (or behind
//! one coarse lock), and all resulting callbacks have fired by the time
//! an operation returns.

use std::collections::VecDeque;
use std::fmt;
use std::io;

use crate::arena::Arena;
use crate::error::BookError;
use crate::events::{Notification, OrderCallback, OrderKind, Side, SideOfMarket};
use crate::journal::{Journal, TimeSale};
use crate::price_level::PriceLevel;
use crate::registry::{OrderId, OrderRegistry};
use crate::tick::{TickKind, TickLadder};

/// A single-instrument limit order book with price-time priority matching,
/// stop and stop-limit triggers, and per-order execution callbacks.
pub struct OrderBook {
    pub(crate) ladder: TickLadder,
    /// One entry per valid tick; index 0 is the minimum price.
    pub(crate) levels: Vec<PriceLevel>,
    pub(crate) arena: Arena,
    pub(crate) registry: OrderRegistry,

    /// Highest tick holding a nonempty bid limit chain.
    pub(crate) inside_bid: Option<u32>,
    /// Lowest tick holding a nonempty ask limit chain.
    pub(crate) inside_ask: Option<u32>,

    // Occupied stop-trigger bounds per side. Maintained as a superset of
    // the truth: pulls may leave them stale, trigger sweeps re-tighten.
    pub(crate) low_buy_stop: Option<u32>,
    pub(crate) high_buy_stop: Option<u32>,
    pub(crate) low_sell_stop: Option<u32>,
    pub(crate) high_sell_stop: Option<u32>,

    pub(crate) total_bid: u64,
    pub(crate) total_ask: u64,
    pub(crate) last_price: Option<f64>,
    pub(crate) last_size: u32,
    pub(crate) volume: u64,

    pub(crate) journal: Journal,
    pub(crate) pending: VecDeque<Notification>,
}

impl OrderBook {
    /// Create a book spanning [min_price, max_price] at the given tick size.
    ///
    /// Both bounds round to the nearest tick; the rounded minimum must be
    /// positive and not exceed the rounded maximum.
    pub fn new(kind: TickKind, min_price: f64, max_price: f64) -> Result<Self, BookError> {
        let ladder = TickLadder::new(kind, min_price, max_price)?;
        let count = ladder.tick_count();
        Ok(Self {
            ladder,
            levels: vec![PriceLevel::new(); count],
            arena: Arena::with_capacity(1024),
            registry: OrderRegistry::new(),
            inside_bid: None,
            inside_ask: None,
            low_buy_stop: None,
            high_buy_stop: None,
            low_sell_stop: None,
            high_sell_stop: None,
            total_bid: 0,
            total_ask: 0,
            last_price: None,
            last_size: 0,
            volume: 0,
            journal: Journal::new(),
            pending: VecDeque::new(),
        })
    }

    // ========================================================================
    // Inserts
    // ========================================================================

    /// Insert a limit order: match what crosses, rest the remainder.
    pub fn insert_limit(
        &mut self,
        side: Side,
        limit: f64,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        let tick = self.ladder.tick_of(limit)?;
        let id = self.registry.next_id();
        self.execute_limit(id, side, tick, size, cb);
        self.drain_notifications();
        Ok(id)
    }

    /// Insert a market order: match at successively worse prices until
    /// filled or the opposite side is exhausted. Any unfilled remainder is
    /// discarded and reported as a cancel; market orders never rest.
    pub fn insert_market(
        &mut self,
        side: Side,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        let id = self.registry.next_id();
        self.execute_market(id, side, size, cb);
        self.drain_notifications();
        Ok(id)
    }

    /// Insert a stop order resting at its trigger tick. Once a trade prints
    /// at or through the trigger, the stop is promoted to a market order.
    pub fn insert_stop(
        &mut self,
        side: Side,
        stop: f64,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        let trigger = self.ladder.tick_of(stop)?;
        let id = self.registry.next_id();
        self.rest_stop(id, OrderKind::Stop, side, trigger, None, size, cb);
        Ok(id)
    }

    /// Insert a stop-limit order: like a stop, but promoted to a limit
    /// order at the recorded limit price when triggered.
    pub fn insert_stop_limit(
        &mut self,
        side: Side,
        stop: f64,
        limit: f64,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        let trigger = self.ladder.tick_of(stop)?;
        let limit_tick = self.ladder.tick_of(limit)?;
        let id = self.registry.next_id();
        self.rest_stop(id, OrderKind::StopLimit, side, trigger, Some(limit_tick), size, cb);
        Ok(id)
    }

    // ========================================================================
    // Pull / replace
    // ========================================================================

    /// Cancel a resting order by id. Returns `true` iff the order existed;
    /// the owner receives a cancel message with the remaining size.
    pub fn pull_order(&mut self, id: OrderId) -> bool {
        let pulled = self.pull_no_drain(id);
        if pulled {
            self.drain_notifications();
        }
        pulled
    }

    /// Atomically pull `id` and insert a new limit order, returning the new
    /// id. If `id` is unknown, fails without inserting; new-order arguments
    /// are validated before the pull so a failed replace never half-commits.
    pub fn replace_with_limit(
        &mut self,
        id: OrderId,
        side: Side,
        limit: f64,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        let tick = self.ladder.tick_of(limit)?;
        self.require_order(id)?;
        self.pull_no_drain(id);
        let new_id = self.registry.next_id();
        self.execute_limit(new_id, side, tick, size, cb);
        self.drain_notifications();
        Ok(new_id)
    }

    /// Atomically pull `id` and insert a market order.
    pub fn replace_with_market(
        &mut self,
        id: OrderId,
        side: Side,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        self.require_order(id)?;
        self.pull_no_drain(id);
        let new_id = self.registry.next_id();
        self.execute_market(new_id, side, size, cb);
        self.drain_notifications();
        Ok(new_id)
    }

    /// Atomically pull `id` and insert a stop order.
    pub fn replace_with_stop(
        &mut self,
        id: OrderId,
        side: Side,
        stop: f64,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        let trigger = self.ladder.tick_of(stop)?;
        self.require_order(id)?;
        self.pull_no_drain(id);
        let new_id = self.registry.next_id();
        self.rest_stop(new_id, OrderKind::Stop, side, trigger, None, size, cb);
        self.drain_notifications();
        Ok(new_id)
    }

    /// Atomically pull `id` and insert a stop-limit order.
    pub fn replace_with_stop_limit(
        &mut self,
        id: OrderId,
        side: Side,
        stop: f64,
        limit: f64,
        size: u32,
        cb: Option<OrderCallback>,
    ) -> Result<OrderId, BookError> {
        if size == 0 {
            return Err(BookError::InvalidSize);
        }
        let trigger = self.ladder.tick_of(stop)?;
        let limit_tick = self.ladder.tick_of(limit)?;
        self.require_order(id)?;
        self.pull_no_drain(id);
        let new_id = self.registry.next_id();
        self.rest_stop(new_id, OrderKind::StopLimit, side, trigger, Some(limit_tick), size, cb);
        self.drain_notifications();
        Ok(new_id)
    }

    fn require_order(&self, id: OrderId) -> Result<(), BookError> {
        if self.registry.contains(id) {
            Ok(())
        } else {
            Err(BookError::OrderNotFound(id))
        }
    }

    // ========================================================================
    // Market state queries
    // ========================================================================

    #[inline]
    pub fn min_price(&self) -> f64 {
        self.ladder.min_price()
    }

    #[inline]
    pub fn max_price(&self) -> f64 {
        self.ladder.max_price()
    }

    #[inline]
    pub fn tick_size(&self) -> f64 {
        self.ladder.tick_size()
    }

    /// Best bid price, if any bid liquidity rests.
    #[inline]
    pub fn bid_price(&self) -> Option<f64> {
        self.inside_bid.map(|t| self.ladder.price_of(t))
    }

    /// Best ask price, if any ask liquidity rests.
    #[inline]
    pub fn ask_price(&self) -> Option<f64> {
        self.inside_ask.map(|t| self.ladder.price_of(t))
    }

    /// Price of the last trade.
    #[inline]
    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    /// Aggregate size at the inside bid (0 if none).
    #[inline]
    pub fn bid_size(&self) -> u64 {
        self.inside_bid
            .map(|t| self.levels[t as usize].limits.total_qty())
            .unwrap_or(0)
    }

    /// Aggregate size at the inside ask (0 if none).
    #[inline]
    pub fn ask_size(&self) -> u64 {
        self.inside_ask
            .map(|t| self.levels[t as usize].limits.total_qty())
            .unwrap_or(0)
    }

    /// Aggregate size of all resting bids.
    #[inline]
    pub fn total_bid_size(&self) -> u64 {
        self.total_bid
    }

    /// Aggregate size of all resting asks.
    #[inline]
    pub fn total_ask_size(&self) -> u64 {
        self.total_ask
    }

    /// Aggregate size of all resting limit orders.
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.total_bid + self.total_ask
    }

    /// Size of the last trade (0 if none).
    #[inline]
    pub fn last_size(&self) -> u32 {
        self.last_size
    }

    /// Cumulative traded volume since construction.
    #[inline]
    pub fn volume(&self) -> u64 {
        self.volume
    }

    /// Number of live orders (resting limits and stops).
    #[inline]
    pub fn order_count(&self) -> usize {
        self.registry.len()
    }

    // ========================================================================
    // Tick helpers
    // ========================================================================

    /// Round a price to the book's tick grid (half-up).
    #[inline]
    pub fn price_to_tick(&self, price: f64) -> f64 {
        self.ladder.kind().round_to_tick(price)
    }

    /// Whether `price` rounds to a tick inside [min_price, max_price].
    #[inline]
    pub fn is_valid_price(&self, price: f64) -> bool {
        self.ladder.is_valid_price(price)
    }

    /// Number of ticks between two prices.
    #[inline]
    pub fn ticks_in_range(&self, lower: f64, upper: f64) -> Result<u64, BookError> {
        self.ladder.kind().ticks_in_range(lower, upper)
    }

    /// Bytes of level storage a range of this book's tick kind pre-allocates.
    #[inline]
    pub fn tick_memory_required(&self, lower: f64, upper: f64) -> Result<u64, BookError> {
        self.ladder.kind().tick_memory_required(lower, upper)
    }

    // ========================================================================
    // Depth
    // ========================================================================

    /// Aggregate size of the best `depth` nonempty bid levels, best first.
    pub fn bid_depth(&self, depth: usize) -> Result<Vec<(f64, u64)>, BookError> {
        self.validate_depth(depth)?;
        Ok(self.collect_depth(Side::Buy, depth))
    }

    /// Aggregate size of the best `depth` nonempty ask levels, best first.
    pub fn ask_depth(&self, depth: usize) -> Result<Vec<(f64, u64)>, BookError> {
        self.validate_depth(depth)?;
        Ok(self.collect_depth(Side::Sell, depth))
    }

    /// Both sides of the book to `depth` levels each, tagged with side and
    /// ordered by ascending price.
    pub fn market_depth(&self, depth: usize) -> Result<Vec<(f64, u64, SideOfMarket)>, BookError> {
        self.validate_depth(depth)?;
        let mut bids = self.collect_depth(Side::Buy, depth);
        bids.reverse();
        let mut out: Vec<(f64, u64, SideOfMarket)> = bids
            .into_iter()
            .map(|(p, s)| (p, s, SideOfMarket::Bid))
            .collect();
        out.extend(
            self.collect_depth(Side::Sell, depth)
                .into_iter()
                .map(|(p, s)| (p, s, SideOfMarket::Ask)),
        );
        Ok(out)
    }

    fn validate_depth(&self, depth: usize) -> Result<(), BookError> {
        if depth == 0 {
            return Err(BookError::InvalidDepth(depth));
        }
        if depth > self.levels.len() {
            return Err(BookError::DepthExceedsBook {
                requested: depth,
                available: self.levels.len(),
            });
        }
        Ok(())
    }

    /// Walk from the inside toward the book edge collecting nonempty limit
    /// levels, best first.
    fn collect_depth(&self, side: Side, depth: usize) -> Vec<(f64, u64)> {
        let mut out = Vec::new();
        let inside = match side {
            Side::Buy => self.inside_bid,
            Side::Sell => self.inside_ask,
        };
        let Some(inside) = inside else {
            return out;
        };
        let mut t = inside as i64;
        let step: i64 = if side.is_buy() { -1 } else { 1 };
        while t >= 0 && (t as usize) < self.levels.len() && out.len() < depth {
            let chain = &self.levels[t as usize].limits;
            if !chain.is_empty() {
                out.push((self.ladder.price_of(t as u32), chain.total_qty()));
            }
            t += step;
        }
        out
    }

    // ========================================================================
    // Time and sales
    // ========================================================================

    /// The most recent `n` trades (all, if `None`), oldest first.
    #[inline]
    pub fn time_and_sales(&self, n: Option<usize>) -> &[TimeSale] {
        self.journal.recent(n)
    }

    // ========================================================================
    // Growing the book
    // ========================================================================

    /// Extend the tick range upward to `new_max`. Nothing matches or
    /// cancels; no callbacks fire.
    pub fn grow_book_above(&mut self, new_max: f64) -> Result<(), BookError> {
        let added = self.ladder.grow_above(new_max)?;
        self.levels
            .resize_with(self.levels.len() + added as usize, PriceLevel::default);
        tracing::debug!(new_max, added, "grew book above");
        Ok(())
    }

    /// Extend the tick range downward to `new_min`. Every existing tick
    /// index shifts up by the number of prepended levels; registry
    /// locators, inside pointers, and stop bounds are re-based together so
    /// no chain membership changes.
    pub fn grow_book_below(&mut self, new_min: f64) -> Result<(), BookError> {
        let shift = self.ladder.grow_below(new_min)?;
        self.levels.splice(
            0..0,
            std::iter::repeat_with(PriceLevel::default).take(shift as usize),
        );
        for entry in self.registry.entries_mut() {
            entry.tick += shift;
            if let Some(limit_tick) = entry.limit_tick.as_mut() {
                *limit_tick += shift;
            }
        }
        for slot in [
            &mut self.inside_bid,
            &mut self.inside_ask,
            &mut self.low_buy_stop,
            &mut self.high_buy_stop,
            &mut self.low_sell_stop,
            &mut self.high_sell_stop,
        ] {
            if let Some(t) = slot.as_mut() {
                *t += shift;
            }
        }
        tracing::debug!(new_min, shift, "grew book below");
        Ok(())
    }

    // ========================================================================
    // Dumps
    // ========================================================================

    /// Write all resting buy limit orders, best price first.
    pub fn dump_buy_limits(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.dump_limits(Side::Buy, out)
    }

    /// Write all resting sell limit orders, best price first.
    pub fn dump_sell_limits(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.dump_limits(Side::Sell, out)
    }

    /// Write all resting buy stop orders, highest trigger first.
    pub fn dump_buy_stops(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.dump_stops(Side::Buy, out)
    }

    /// Write all resting sell stop orders, highest trigger first.
    pub fn dump_sell_stops(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.dump_stops(Side::Sell, out)
    }

    fn dump_limits(&self, side: Side, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "*** {} limits ***", side)?;
        for t in (0..self.levels.len()).rev() {
            let chain = &self.levels[t].limits;
            if chain.is_empty() || !chain.has_side(&self.arena, side) {
                continue;
            }
            write!(out, "{}", self.ladder.price_of(t as u32))?;
            for idx in chain.iter(&self.arena) {
                let node = self.arena.get(idx);
                write!(out, " <#{} sz {}>", node.id, node.qty)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn dump_stops(&self, side: Side, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "*** {} stops ***", side)?;
        for t in (0..self.levels.len()).rev() {
            let chain = &self.levels[t].stops;
            if chain.is_empty() || !chain.has_side(&self.arena, side) {
                continue;
            }
            write!(out, "{}", self.ladder.price_of(t as u32))?;
            for idx in chain.iter(&self.arena) {
                let node = self.arena.get(idx);
                if node.side() != side {
                    continue;
                }
                match self.registry.get(node.id).and_then(|e| e.limit_tick) {
                    Some(lt) => write!(
                        out,
                        " <#{} sz {} limit {}>",
                        node.id,
                        node.qty,
                        self.ladder.price_of(lt)
                    )?,
                    None => write!(out, " <#{} sz {}>", node.id, node.qty)?,
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("min_price", &self.min_price())
            .field("max_price", &self.max_price())
            .field("tick_size", &self.tick_size())
            .field("bid", &self.bid_price())
            .field("ask", &self.ask_price())
            .field("orders", &self.registry.len())
            .field("volume", &self.volume)
            .finish()
    }
}
