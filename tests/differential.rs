//! Differential test - compares the engine against a naive reference book.
//!
//! The reference is slow but obviously correct: BTreeMap price levels with
//! plain FIFO vectors, and a flat insertion-ordered list of resting stops
//! that is re-scanned after every fill. Both books consume the same seeded
//! command stream of limit, market, stop, stop-limit, and pull operations;
//! inside prices, last trade, order counts, totals, and traded volume must
//! agree after every operation.

use std::collections::{BTreeMap, HashMap, VecDeque};

use matchbook::{OrderBook, OrderId, Side, TickKind};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Prices handled as integer cents to keep the reference exact.
const MIN_CENTS: i64 = 9_000;
const MAX_CENTS: i64 = 11_000;

fn cents_to_price(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// A resting stop in the reference model. `limit_cents` of `None` promotes
/// to a market order, `Some` to a limit order at that price.
struct RefStop {
    id: OrderId,
    side: Side,
    trigger_cents: i64,
    limit_cents: Option<i64>,
    qty: u32,
}

struct ReferenceBook {
    bids: BTreeMap<i64, VecDeque<(OrderId, u32)>>,
    asks: BTreeMap<i64, VecDeque<(OrderId, u32)>>,
    orders: HashMap<OrderId, (Side, i64)>,
    /// Resting stops in insertion order (time priority within a trigger).
    stops: Vec<RefStop>,
    volume: u64,
    last_cents: Option<i64>,
}

impl ReferenceBook {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            stops: Vec::new(),
            volume: 0,
            last_cents: None,
        }
    }

    fn best_bid(&self) -> Option<i64> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<i64> {
        self.asks.keys().next().copied()
    }

    fn total_size(&self, side: Side) -> u64 {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels
            .values()
            .flat_map(|q| q.iter().map(|&(_, qty)| qty as u64))
            .sum()
    }

    /// Cross then rest, mirroring price-time priority.
    fn place_limit(&mut self, id: OrderId, side: Side, cents: i64, mut qty: u32) {
        qty = self.cross(side, Some(cents), qty);
        if qty > 0 {
            let levels = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            levels.entry(cents).or_default().push_back((id, qty));
            self.orders.insert(id, (side, cents));
        }
    }

    /// Market order: cross without a bound, discard the remainder.
    fn place_market(&mut self, side: Side, qty: u32) {
        self.cross(side, None, qty);
    }

    fn place_stop(
        &mut self,
        id: OrderId,
        side: Side,
        trigger_cents: i64,
        limit_cents: Option<i64>,
        qty: u32,
    ) {
        self.stops.push(RefStop {
            id,
            side,
            trigger_cents,
            limit_cents,
            qty,
        });
    }

    fn cross(&mut self, side: Side, limit: Option<i64>, mut qty: u32) -> u32 {
        loop {
            if qty == 0 {
                break;
            }
            let best = match side {
                Side::Buy => self.best_ask(),
                Side::Sell => self.best_bid(),
            };
            let Some(best) = best else { break };
            if let Some(limit) = limit {
                let crosses = match side {
                    Side::Buy => limit >= best,
                    Side::Sell => limit <= best,
                };
                if !crosses {
                    break;
                }
            }
            let levels = match side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let queue = levels.get_mut(&best).unwrap();
            let (maker_id, maker_qty) = queue[0];
            let fill = qty.min(maker_qty);
            qty -= fill;
            self.volume += fill as u64;
            self.last_cents = Some(best);
            if fill == maker_qty {
                queue.pop_front();
                self.orders.remove(&maker_id);
                if queue.is_empty() {
                    levels.remove(&best);
                }
            } else {
                queue[0].1 -= fill;
            }

            // every print sweeps the stops before the next fill
            self.sweep_stops(best);
        }
        qty
    }

    /// Promote every stop triggered by a fill at `fill_cents`: buy stops
    /// (trigger at or below) in ascending trigger order first, then sell
    /// stops (trigger at or above) descending, time priority within a
    /// trigger. All triggered stops leave the resting list before any
    /// promotion executes; promotions cascade through the nested crosses.
    fn sweep_stops(&mut self, fill_cents: i64) {
        let mut triggered: Vec<RefStop> = Vec::new();

        let mut i = 0;
        while i < self.stops.len() {
            let s = &self.stops[i];
            if s.side == Side::Buy && s.trigger_cents <= fill_cents {
                triggered.push(self.stops.remove(i));
            } else {
                i += 1;
            }
        }
        // stable sort keeps insertion order within one trigger price
        triggered.sort_by_key(|s| s.trigger_cents);

        let mut sells: Vec<RefStop> = Vec::new();
        let mut i = 0;
        while i < self.stops.len() {
            let s = &self.stops[i];
            if s.side == Side::Sell && s.trigger_cents >= fill_cents {
                sells.push(self.stops.remove(i));
            } else {
                i += 1;
            }
        }
        sells.sort_by_key(|s| std::cmp::Reverse(s.trigger_cents));
        triggered.extend(sells);

        for stop in triggered {
            match stop.limit_cents {
                Some(limit) => self.place_limit(stop.id, stop.side, limit, stop.qty),
                None => {
                    self.cross(stop.side, None, stop.qty);
                }
            }
        }
    }

    fn pull(&mut self, id: OrderId) -> bool {
        if let Some(pos) = self.stops.iter().position(|s| s.id == id) {
            self.stops.remove(pos);
            return true;
        }
        let Some((side, cents)) = self.orders.remove(&id) else {
            return false;
        };
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(queue) = levels.get_mut(&cents) {
            queue.retain(|&(qid, _)| qid != id);
            if queue.is_empty() {
                levels.remove(&cents);
            }
        }
        true
    }

    fn order_count(&self) -> usize {
        self.orders.len() + self.stops.len()
    }
}

fn assert_books_agree(engine: &OrderBook, reference: &ReferenceBook, op: usize) {
    assert_eq!(
        engine.bid_price(),
        reference.best_bid().map(cents_to_price),
        "best bid mismatch at op {op}"
    );
    assert_eq!(
        engine.ask_price(),
        reference.best_ask().map(cents_to_price),
        "best ask mismatch at op {op}"
    );
    assert_eq!(
        engine.last_price(),
        reference.last_cents.map(cents_to_price),
        "last price mismatch at op {op}"
    );
    assert_eq!(engine.volume(), reference.volume, "volume mismatch at op {op}");
    assert_eq!(
        engine.total_bid_size(),
        reference.total_size(Side::Buy),
        "bid total mismatch at op {op}"
    );
    assert_eq!(
        engine.total_ask_size(),
        reference.total_size(Side::Sell),
        "ask total mismatch at op {op}"
    );
    assert_eq!(
        engine.order_count(),
        reference.order_count(),
        "order count mismatch at op {op}"
    );
}

fn random_side(rng: &mut ChaCha8Rng) -> Side {
    if rng.gen_bool(0.5) {
        Side::Buy
    } else {
        Side::Sell
    }
}

fn run_differential(seed: u64, ops: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut engine = OrderBook::new(
        TickKind::Hundredth,
        cents_to_price(MIN_CENTS),
        cents_to_price(MAX_CENTS),
    )
    .unwrap();
    let mut reference = ReferenceBook::new();
    let mut issued: Vec<OrderId> = Vec::new();

    for op in 0..ops {
        let roll: f64 = rng.gen();
        if issued.is_empty() || roll < 0.50 {
            let side = random_side(&mut rng);
            let cents = rng.gen_range(MIN_CENTS + 500..MAX_CENTS - 500);
            let qty = rng.gen_range(1..200);
            let id = engine
                .insert_limit(side, cents_to_price(cents), qty, None)
                .unwrap();
            reference.place_limit(id, side, cents, qty);
            issued.push(id);
        } else if roll < 0.65 {
            let side = random_side(&mut rng);
            let qty = rng.gen_range(1..300);
            engine.insert_market(side, qty, None).unwrap();
            reference.place_market(side, qty);
        } else if roll < 0.80 {
            let side = random_side(&mut rng);
            let trigger = rng.gen_range(MIN_CENTS + 500..MAX_CENTS - 500);
            let qty = rng.gen_range(1..150);
            let id = if rng.gen_bool(0.5) {
                let id = engine
                    .insert_stop(side, cents_to_price(trigger), qty, None)
                    .unwrap();
                reference.place_stop(id, side, trigger, None, qty);
                id
            } else {
                let limit = rng.gen_range(MIN_CENTS + 500..MAX_CENTS - 500);
                let id = engine
                    .insert_stop_limit(
                        side,
                        cents_to_price(trigger),
                        cents_to_price(limit),
                        qty,
                        None,
                    )
                    .unwrap();
                reference.place_stop(id, side, trigger, Some(limit), qty);
                id
            };
            issued.push(id);
        } else {
            let idx = rng.gen_range(0..issued.len());
            let id = issued.swap_remove(idx);
            let engine_pulled = engine.pull_order(id);
            let reference_pulled = reference.pull(id);
            assert_eq!(engine_pulled, reference_pulled, "pull mismatch at op {op}");
        }

        assert_books_agree(&engine, &reference, op);
    }
}

#[test]
fn test_differential_small() {
    run_differential(0xDEADBEEF, 2_000);
}

#[test]
fn test_differential_large() {
    run_differential(0xCAFEBABE, 20_000);
}

#[test]
fn test_differential_alternate_seed() {
    run_differential(0x12345678, 5_000);
}

#[test]
fn test_differential_survives_grow() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xFEEDFACE);
    let mut engine = OrderBook::new(TickKind::Hundredth, 95.0, 105.0).unwrap();
    let mut reference = ReferenceBook::new();
    let mut issued: Vec<OrderId> = Vec::new();

    for op in 0..2_000 {
        if op == 500 {
            engine.grow_book_below(50.0).unwrap();
        }
        if op == 1_000 {
            engine.grow_book_above(150.0).unwrap();
        }

        let roll: f64 = rng.gen();
        if issued.is_empty() || roll < 0.55 {
            let side = random_side(&mut rng);
            let cents = rng.gen_range(9_700..10_300);
            let qty = rng.gen_range(1..100);
            let id = engine
                .insert_limit(side, cents_to_price(cents), qty, None)
                .unwrap();
            reference.place_limit(id, side, cents, qty);
            issued.push(id);
        } else if roll < 0.75 {
            let side = random_side(&mut rng);
            let trigger = rng.gen_range(9_700..10_300);
            let qty = rng.gen_range(1..100);
            let id = engine
                .insert_stop(side, cents_to_price(trigger), qty, None)
                .unwrap();
            reference.place_stop(id, side, trigger, None, qty);
            issued.push(id);
        } else {
            let idx = rng.gen_range(0..issued.len());
            let id = issued.swap_remove(idx);
            assert_eq!(engine.pull_order(id), reference.pull(id), "pull mismatch at op {op}");
        }

        assert_books_agree(&engine, &reference, op);
    }
}
