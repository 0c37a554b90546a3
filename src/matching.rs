//! Matching and trigger engine - crossing, stop sweeps, promotion, and
//! deferred callback dispatch.
//!
//! The crossing loop consumes the opposite inside chain head-first
//! (price-time priority), runs the stop trigger sweep after every fill,
//! and rests or cancels the residual. Promoted stops match inside the
//! same top-level call; callbacks are queued during matching and fire
//! only once the book has quiesced.

use std::panic::{self, AssertUnwindSafe};

use crate::arena::NULL_INDEX;
use crate::events::{CallbackMsg, Notification, OrderCallback, OrderKind, Side};
use crate::order_book::OrderBook;
use crate::registry::{OrderEntry, OrderId};

/// A triggered stop, popped off its chain and awaiting promotion.
struct Promotion {
    id: OrderId,
    kind: OrderKind,
    side: Side,
    qty: u32,
    limit_tick: Option<u32>,
    cb: Option<OrderCallback>,
}

impl OrderBook {
    // ========================================================================
    // Execution entry points (public wrappers validate and drain)
    // ========================================================================

    /// Match a limit order and rest the remainder at its tick.
    pub(crate) fn execute_limit(
        &mut self,
        id: OrderId,
        side: Side,
        tick: u32,
        size: u32,
        cb: Option<OrderCallback>,
    ) {
        let residual = self.match_incoming(id, side, Some(tick), size, &cb);
        if residual > 0 {
            self.rest_limit(id, side, tick, residual, cb);
        }
    }

    /// Match a market order. The unfilled remainder is cancelled, never
    /// rested.
    pub(crate) fn execute_market(
        &mut self,
        id: OrderId,
        side: Side,
        size: u32,
        cb: Option<OrderCallback>,
    ) {
        let residual = self.match_incoming(id, side, None, size, &cb);
        if residual > 0 {
            self.enqueue(&cb, CallbackMsg::Cancel, id, 0.0, residual);
        }
    }

    // ========================================================================
    // Crossing
    // ========================================================================

    /// Cross an incoming order against the opposite side while it remains
    /// marketable. `limit` of `None` means no price bound (market order).
    ///
    /// Returns the residual size.
    fn match_incoming(
        &mut self,
        taker: OrderId,
        side: Side,
        limit: Option<u32>,
        mut size: u32,
        taker_cb: &Option<OrderCallback>,
    ) -> u32 {
        while size > 0 {
            let inside = match side {
                Side::Buy => self.inside_ask,
                Side::Sell => self.inside_bid,
            };
            let Some(t) = inside else { break };
            if let Some(limit) = limit {
                let crosses = match side {
                    Side::Buy => limit >= t,
                    Side::Sell => limit <= t,
                };
                if !crosses {
                    break;
                }
            }

            let head = self.levels[t as usize].limits.peek_head();
            debug_assert!(head != NULL_INDEX, "inside pointer at an empty chain");

            let (maker, maker_qty) = {
                let node = self.arena.get(head);
                (node.id, node.qty)
            };
            let fill = size.min(maker_qty);
            size -= fill;

            let maker_cb = if fill == maker_qty {
                // maker fully filled: off the chain, out of the registry
                self.levels[t as usize].limits.pop_front(&mut self.arena);
                let cb = self.registry.remove(maker).and_then(|e| e.cb);
                self.arena.free(head);
                cb
            } else {
                self.arena.get_mut(head).qty -= fill;
                self.levels[t as usize].limits.subtract_qty(fill);
                self.registry.get(maker).and_then(|e| e.cb.clone())
            };

            match side {
                Side::Buy => self.total_ask -= fill as u64,
                Side::Sell => self.total_bid -= fill as u64,
            }

            let price = self.ladder.price_of(t);
            self.last_price = Some(price);
            self.last_size = fill;
            self.volume += fill as u64;
            self.journal.record(price, fill);

            // maker first, then taker
            self.enqueue(&maker_cb, CallbackMsg::Fill, maker, price, fill);
            self.enqueue(taker_cb, CallbackMsg::Fill, taker, price, fill);

            if self.levels[t as usize].limits.is_empty() {
                match side {
                    Side::Buy => self.advance_inside_ask(),
                    Side::Sell => self.advance_inside_bid(),
                }
            }

            // Triggered stops promote and match inside this same call,
            // before the incoming order takes another fill.
            self.check_stops(t);
        }
        size
    }

    // ========================================================================
    // Resting
    // ========================================================================

    fn rest_limit(
        &mut self,
        id: OrderId,
        side: Side,
        tick: u32,
        qty: u32,
        cb: Option<OrderCallback>,
    ) {
        let node = self.arena.alloc();
        {
            let n = self.arena.get_mut(node);
            n.id = id;
            n.qty = qty;
            n.set_side(side);
        }
        self.levels[tick as usize].limits.push_back(&mut self.arena, node);
        self.registry.insert(
            id,
            OrderEntry {
                kind: OrderKind::Limit,
                side,
                tick,
                node,
                limit_tick: None,
                cb,
            },
        );
        match side {
            Side::Buy => {
                self.total_bid += qty as u64;
                if self.inside_bid.map_or(true, |b| tick > b) {
                    self.inside_bid = Some(tick);
                }
            }
            Side::Sell => {
                self.total_ask += qty as u64;
                if self.inside_ask.map_or(true, |a| tick < a) {
                    self.inside_ask = Some(tick);
                }
            }
        }
    }

    pub(crate) fn rest_stop(
        &mut self,
        id: OrderId,
        kind: OrderKind,
        side: Side,
        trigger: u32,
        limit_tick: Option<u32>,
        qty: u32,
        cb: Option<OrderCallback>,
    ) {
        debug_assert!(matches!(kind, OrderKind::Stop | OrderKind::StopLimit));
        let node = self.arena.alloc();
        {
            let n = self.arena.get_mut(node);
            n.id = id;
            n.qty = qty;
            n.set_side(side);
        }
        self.levels[trigger as usize].stops.push_back(&mut self.arena, node);
        self.registry.insert(
            id,
            OrderEntry {
                kind,
                side,
                tick: trigger,
                node,
                limit_tick,
                cb,
            },
        );
        match side {
            Side::Buy => {
                self.low_buy_stop = Some(self.low_buy_stop.map_or(trigger, |t| t.min(trigger)));
                self.high_buy_stop = Some(self.high_buy_stop.map_or(trigger, |t| t.max(trigger)));
            }
            Side::Sell => {
                self.low_sell_stop = Some(self.low_sell_stop.map_or(trigger, |t| t.min(trigger)));
                self.high_sell_stop =
                    Some(self.high_sell_stop.map_or(trigger, |t| t.max(trigger)));
            }
        }
    }

    // ========================================================================
    // Pull
    // ========================================================================

    /// Remove an order from its chain and the registry, queueing the cancel
    /// message. The caller drains.
    pub(crate) fn pull_no_drain(&mut self, id: OrderId) -> bool {
        let Some(entry) = self.registry.remove(id) else {
            return false;
        };
        let qty = self.arena.get(entry.node).qty;
        let level = &mut self.levels[entry.tick as usize];
        match entry.kind {
            OrderKind::Stop | OrderKind::StopLimit => {
                // stop bounds stay a superset; the next sweep tightens them
                level.stops.unlink(&mut self.arena, entry.node);
            }
            _ => {
                let emptied = level.limits.unlink(&mut self.arena, entry.node);
                match entry.side {
                    Side::Buy => {
                        self.total_bid -= qty as u64;
                        if emptied && self.inside_bid == Some(entry.tick) {
                            self.advance_inside_bid();
                        }
                    }
                    Side::Sell => {
                        self.total_ask -= qty as u64;
                        if emptied && self.inside_ask == Some(entry.tick) {
                            self.advance_inside_ask();
                        }
                    }
                }
            }
        }
        self.arena.free(entry.node);
        self.enqueue(&entry.cb, CallbackMsg::Cancel, id, 0.0, qty);
        true
    }

    // ========================================================================
    // Inside pointer maintenance
    // ========================================================================

    /// Move the inside ask up to the next nonempty ask level, or clear it.
    fn advance_inside_ask(&mut self) {
        let Some(mut t) = self.inside_ask else { return };
        let top = self.levels.len() as u32;
        loop {
            if !self.levels[t as usize].limits.is_empty() {
                self.inside_ask = Some(t);
                return;
            }
            t += 1;
            if t >= top {
                self.inside_ask = None;
                return;
            }
        }
    }

    /// Move the inside bid down to the next nonempty bid level, or clear it.
    fn advance_inside_bid(&mut self) {
        let Some(mut t) = self.inside_bid else { return };
        loop {
            if !self.levels[t as usize].limits.is_empty() {
                self.inside_bid = Some(t);
                return;
            }
            if t == 0 {
                self.inside_bid = None;
                return;
            }
            t -= 1;
        }
    }

    // ========================================================================
    // Stop trigger sweep
    // ========================================================================

    /// Pop and promote every stop triggered by a fill at `fill_tick`.
    ///
    /// Buy stops (trigger at or below the fill) sweep first in ascending
    /// trigger order, then sell stops (trigger at or above) in descending
    /// order; FIFO within a tick. Every triggered stop leaves its chain and
    /// the registry before any promotion executes, so a cascading promotion
    /// cannot re-trigger an already-popped stop.
    fn check_stops(&mut self, fill_tick: u32) {
        let mut promotions: Vec<Promotion> = Vec::new();

        if let (Some(low), Some(high)) = (self.low_buy_stop, self.high_buy_stop) {
            if low <= fill_tick {
                let swept_top = fill_tick.min(high);
                for t in low..=swept_top {
                    self.pop_triggered(t, Side::Buy, &mut promotions);
                }
                self.retighten_buy_stops(swept_top);
            }
        }
        if let (Some(low), Some(high)) = (self.low_sell_stop, self.high_sell_stop) {
            if high >= fill_tick {
                let swept_bottom = fill_tick.max(low);
                let mut t = high;
                loop {
                    self.pop_triggered(t, Side::Sell, &mut promotions);
                    if t == swept_bottom {
                        break;
                    }
                    t -= 1;
                }
                self.retighten_sell_stops(swept_bottom);
            }
        }

        for p in promotions {
            match p.kind {
                OrderKind::StopLimit => {
                    let Some(limit_tick) = p.limit_tick else {
                        debug_assert!(false, "stop-limit without a limit tick");
                        continue;
                    };
                    let price = self.ladder.price_of(limit_tick);
                    self.enqueue(&p.cb, CallbackMsg::StopToLimit, p.id, price, p.qty);
                    self.execute_limit(p.id, p.side, limit_tick, p.qty, p.cb);
                }
                _ => self.execute_market(p.id, p.side, p.qty, p.cb),
            }
        }
    }

    /// Unlink every `side` stop at trigger tick `t` into the promotion
    /// list, preserving FIFO order.
    fn pop_triggered(&mut self, t: u32, side: Side, promotions: &mut Vec<Promotion>) {
        let mut cursor = self.levels[t as usize].stops.peek_head();
        while cursor != NULL_INDEX {
            let node = self.arena.get(cursor);
            let next = node.next;
            let (node_side, id, qty) = (node.side(), node.id, node.qty);
            if node_side == side {
                self.levels[t as usize].stops.unlink(&mut self.arena, cursor);
                if let Some(entry) = self.registry.remove(id) {
                    promotions.push(Promotion {
                        id,
                        kind: entry.kind,
                        side,
                        qty,
                        limit_tick: entry.limit_tick,
                        cb: entry.cb,
                    });
                }
                self.arena.free(cursor);
            }
            cursor = next;
        }
    }

    /// Advance the buy-stop low-water mark past a swept region.
    fn retighten_buy_stops(&mut self, swept_top: u32) {
        let Some(high) = self.high_buy_stop else { return };
        let mut t = swept_top + 1;
        while t <= high {
            if self.levels[t as usize].stops.has_side(&self.arena, Side::Buy) {
                self.low_buy_stop = Some(t);
                return;
            }
            t += 1;
        }
        self.low_buy_stop = None;
        self.high_buy_stop = None;
    }

    /// Lower the sell-stop high-water mark past a swept region.
    fn retighten_sell_stops(&mut self, swept_bottom: u32) {
        let Some(low) = self.low_sell_stop else { return };
        let mut t = swept_bottom;
        while t > low {
            t -= 1;
            if self.levels[t as usize].stops.has_side(&self.arena, Side::Sell) {
                self.high_sell_stop = Some(t);
                return;
            }
        }
        self.low_sell_stop = None;
        self.high_sell_stop = None;
    }

    // ========================================================================
    // Deferred notification dispatch
    // ========================================================================

    /// Queue a callback invocation in engine-generation order.
    pub(crate) fn enqueue(
        &mut self,
        cb: &Option<OrderCallback>,
        msg: CallbackMsg,
        id: OrderId,
        price: f64,
        size: u32,
    ) {
        if let Some(cb) = cb {
            self.pending.push_back(Notification {
                cb: cb.clone(),
                msg,
                id,
                price,
                size,
            });
        }
    }

    /// Dispatch every pending notification in generation order.
    ///
    /// Runs only after the operation's structural mutation has quiesced.
    /// The whole queue is taken at once, so a callback that reenters the
    /// book finds the queue empty; the nested operation drains its own
    /// notifications to completion before the outer batch resumes
    /// (depth-first nesting). A panicking callback is reported and skipped;
    /// dispatch always continues.
    pub(crate) fn drain_notifications(&mut self) {
        while !self.pending.is_empty() {
            let batch: Vec<Notification> = self.pending.drain(..).collect();
            for n in batch {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    (*n.cb)(&mut *self, n.msg, n.id, n.price, n.size)
                }));
                if outcome.is_err() {
                    tracing::warn!(
                        id = n.id,
                        msg = ?n.msg,
                        "order callback panicked during dispatch"
                    );
                }
            }
        }
    }
}
