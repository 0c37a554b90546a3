//! Order registry - id to locator mapping for O(1) pull and replace.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::arena::ArenaIndex;
use crate::events::{OrderCallback, OrderKind, Side};

/// Order identifier, unique for the book's lifetime.
pub type OrderId = u64;

/// Everything the book records about a resting order.
///
/// `tick` is the limit tick for resting limits and the trigger tick for
/// resting stops; `node` locates the order inside that tick's chain.
pub struct OrderEntry {
    pub kind: OrderKind,
    pub side: Side,
    pub tick: u32,
    pub node: ArenaIndex,
    /// Promotion limit tick, stop-limit orders only
    pub limit_tick: Option<u32>,
    pub cb: Option<OrderCallback>,
}

/// Mapping from order id to its locator, plus the id counter.
///
/// Identifiers are dense and monotonically increasing from 1; an id is
/// never reused, so stale ids fail lookups instead of aliasing.
pub struct OrderRegistry {
    entries: FxHashMap<OrderId, OrderEntry>,
    next_id: OrderId,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Draw the next order identifier.
    #[inline]
    pub fn next_id(&mut self) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    #[inline]
    pub fn insert(&mut self, id: OrderId, entry: OrderEntry) {
        debug_assert!(!self.entries.contains_key(&id));
        self.entries.insert(id, entry);
    }

    #[inline]
    pub fn remove(&mut self, id: OrderId) -> Option<OrderEntry> {
        self.entries.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: OrderId) -> Option<&OrderEntry> {
        self.entries.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: OrderId) -> bool {
        self.entries.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutable walk over every entry (used when the tick range is re-based).
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut OrderEntry> {
        self.entries.values_mut()
    }

    /// Read-only walk over (id, entry) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&OrderId, &OrderEntry)> {
        self.entries.iter()
    }
}

impl Default for OrderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OrderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderRegistry")
            .field("orders", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
