//! Time-and-sales journal - the append-only ledger of trade events.

use std::fmt;

use chrono::{DateTime, Utc};

/// One trade event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeSale {
    pub at: DateTime<Utc>,
    pub price: f64,
    pub size: u32,
}

impl fmt::Display for TimeSale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {:.6}  {}",
            self.at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.price,
            self.size
        )
    }
}

/// Chronological journal of fills. Append-only; one entry per fill event.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<TimeSale>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record a fill at the current wall-clock time.
    #[inline]
    pub fn record(&mut self, price: f64, size: u32) {
        self.entries.push(TimeSale {
            at: Utc::now(),
            price,
            size,
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent `n` entries (all, if `None`), oldest first.
    pub fn recent(&self, n: Option<usize>) -> &[TimeSale] {
        match n {
            Some(n) if n < self.entries.len() => &self.entries[self.entries.len() - n..],
            _ => &self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_in_order() {
        let mut journal = Journal::new();
        journal.record(50.0, 4);
        journal.record(50.1, 3);

        assert_eq!(journal.len(), 2);
        let all = journal.recent(None);
        assert_eq!(all[0].price, 50.0);
        assert_eq!(all[1].price, 50.1);
        assert!(all[0].at <= all[1].at);
    }

    #[test]
    fn test_recent_slices_from_the_back() {
        let mut journal = Journal::new();
        for i in 0..5 {
            journal.record(10.0 + i as f64, 1);
        }

        let last_two = journal.recent(Some(2));
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].price, 13.0);
        assert_eq!(last_two[1].price, 14.0);

        assert_eq!(journal.recent(Some(100)).len(), 5);
        assert_eq!(journal.recent(None).len(), 5);
    }

    #[test]
    fn test_display_has_millisecond_resolution() {
        let entry = TimeSale {
            at: Utc::now(),
            price: 50.25,
            size: 10,
        };
        let s = entry.to_string();
        // "YYYY-mm-dd HH:MM:SS.mmm  price  size"
        assert!(s.contains('.'));
        assert!(s.ends_with("10"));
    }
}
