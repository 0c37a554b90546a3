//! Tick arithmetic - conversion between real prices and integer tick indices.
//!
//! Every price comparison inside the engine happens on integer ticks;
//! floating point only crosses the public boundary. A price is first
//! converted to whole tick units (half-up rounding), then offset against
//! the ladder's base to produce a dense index into the level vector.

use crate::error::BookError;
use crate::price_level::PriceLevel;

/// Supported tick increments, as fractions of the quote unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickKind {
    Quarter,
    Tenth,
    ThirtySecond,
    Hundredth,
    Thousandth,
    TenThousandth,
}

impl TickKind {
    /// Ticks per whole quote unit.
    #[inline]
    pub const fn denominator(self) -> i64 {
        match self {
            TickKind::Quarter => 4,
            TickKind::Tenth => 10,
            TickKind::ThirtySecond => 32,
            TickKind::Hundredth => 100,
            TickKind::Thousandth => 1_000,
            TickKind::TenThousandth => 10_000,
        }
    }

    /// Size of a single tick.
    #[inline]
    pub fn tick_size(self) -> f64 {
        1.0 / self.denominator() as f64
    }

    /// Whole tick units of `price`, rounded half-up.
    #[inline]
    pub fn units(self, price: f64) -> i64 {
        (price * self.denominator() as f64 + 0.5).floor() as i64
    }

    /// Price of `units` whole ticks.
    #[inline]
    pub fn price_of_units(self, units: i64) -> f64 {
        units as f64 / self.denominator() as f64
    }

    /// Round `price` to the nearest valid tick, half-up.
    #[inline]
    pub fn round_to_tick(self, price: f64) -> f64 {
        self.price_of_units(self.units(price))
    }

    /// Number of ticks between two prices.
    pub fn ticks_in_range(self, lower: f64, upper: f64) -> Result<u64, BookError> {
        if lower > upper {
            return Err(BookError::InvalidRange { low: lower, high: upper });
        }
        Ok((self.units(upper) - self.units(lower)) as u64)
    }

    /// Bytes of level storage a book spanning [lower, upper] pre-allocates.
    /// This is not total memory used.
    pub fn tick_memory_required(self, lower: f64, upper: f64) -> Result<u64, BookError> {
        let ticks = self.ticks_in_range(lower, upper)?;
        Ok((ticks + 1) * std::mem::size_of::<PriceLevel>() as u64)
    }
}

/// The fixed price range of a book, mapping prices in [min, max] to dense
/// tick indices `0..tick_count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickLadder {
    kind: TickKind,
    /// Whole tick units of the minimum price (tick index 0).
    base_units: i64,
    /// Whole tick units of the maximum price (the last tick index).
    top_units: i64,
}

impl TickLadder {
    /// Build a ladder over [min_price, max_price].
    ///
    /// Both bounds are rounded to the nearest tick; the rounded minimum must
    /// be positive and must not exceed the rounded maximum.
    pub fn new(kind: TickKind, min_price: f64, max_price: f64) -> Result<Self, BookError> {
        if min_price <= 0.0 || min_price > max_price {
            return Err(BookError::InvalidRange {
                low: min_price,
                high: max_price,
            });
        }
        let base_units = kind.units(min_price);
        let top_units = kind.units(max_price);
        if base_units <= 0 || base_units > top_units {
            return Err(BookError::InvalidRange {
                low: min_price,
                high: max_price,
            });
        }
        Ok(Self {
            kind,
            base_units,
            top_units,
        })
    }

    #[inline]
    pub fn kind(&self) -> TickKind {
        self.kind
    }

    #[inline]
    pub fn min_price(&self) -> f64 {
        self.kind.price_of_units(self.base_units)
    }

    #[inline]
    pub fn max_price(&self) -> f64 {
        self.kind.price_of_units(self.top_units)
    }

    #[inline]
    pub fn tick_size(&self) -> f64 {
        self.kind.tick_size()
    }

    /// Number of valid ticks (price levels) in the ladder.
    #[inline]
    pub fn tick_count(&self) -> usize {
        (self.top_units - self.base_units + 1) as usize
    }

    /// Dense tick index of `price`, if it rounds into range.
    pub fn tick_of(&self, price: f64) -> Result<u32, BookError> {
        let units = self.kind.units(price);
        if units < self.base_units || units > self.top_units {
            return Err(BookError::InvalidPrice(price));
        }
        Ok((units - self.base_units) as u32)
    }

    /// Price at tick index `tick`.
    #[inline]
    pub fn price_of(&self, tick: u32) -> f64 {
        self.kind.price_of_units(self.base_units + tick as i64)
    }

    /// Whether `price` rounds to a tick inside the ladder.
    #[inline]
    pub fn is_valid_price(&self, price: f64) -> bool {
        self.tick_of(price).is_ok()
    }

    /// Raise the maximum price. Returns the number of ticks appended.
    pub fn grow_above(&mut self, new_max: f64) -> Result<u32, BookError> {
        let units = self.kind.units(new_max);
        if units <= self.top_units {
            return Err(BookError::InvalidGrow {
                given: new_max,
                bound: self.max_price(),
            });
        }
        let added = (units - self.top_units) as u32;
        self.top_units = units;
        Ok(added)
    }

    /// Lower the minimum price. Returns the number of ticks prepended;
    /// every existing tick index shifts up by that amount.
    pub fn grow_below(&mut self, new_min: f64) -> Result<u32, BookError> {
        let units = self.kind.units(new_min);
        if units <= 0 || units >= self.base_units {
            return Err(BookError::InvalidGrow {
                given: new_min,
                bound: self.min_price(),
            });
        }
        let shift = (self.base_units - units) as u32;
        self.base_units = units;
        Ok(shift)
    }
}
