//! Record admission for load and clean.

use crate::record::Record;

const SECONDS_PER_DAY: f64 = 86_400.0;

pub trait RecordFilter: Send + Sync {
    fn check(&self, record: &Record) -> bool;

    /// Seconds covered by the filter, when bounded. Drives downsampling.
    fn span(&self) -> Option<i64> {
        None
    }
}

/// Admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl RecordFilter for AcceptAll {
    fn check(&self, _record: &Record) -> bool {
        true
    }
}

/// Inclusive `[from, to]` in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }
}

impl RecordFilter for TimeRange {
    fn check(&self, record: &Record) -> bool {
        record.timestamp >= self.from && record.timestamp <= self.to
    }

    fn span(&self) -> Option<i64> {
        Some(self.to.saturating_sub(self.from).max(0))
    }
}

/// Admits records strictly older than `cutoff`. Used for retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlderThan {
    pub cutoff: i64,
}

impl OlderThan {
    pub fn new(cutoff: i64) -> Self {
        Self { cutoff }
    }
}

impl RecordFilter for OlderThan {
    fn check(&self, record: &Record) -> bool {
        record.timestamp < self.cutoff
    }
}

/// Records per downsampling bucket for a span of `span_secs`, or `None`
/// when the span is a day or less and records pass through untouched.
pub fn bucket_size(span_secs: i64) -> Option<usize> {
    let days = span_secs as f64 / SECONDS_PER_DAY;
    if days <= 1.0 {
        return None;
    }
    Some(((days / 7.0).ceil() * 5.0).ceil() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_is_inclusive() {
        let range = TimeRange::new(100, 200);
        assert!(range.check(&Record::new(100, vec![])));
        assert!(range.check(&Record::new(200, vec![])));
        assert!(!range.check(&Record::new(201, vec![])));
        assert_eq!(range.span(), Some(100));
    }

    #[test]
    fn older_than_is_strict() {
        let filter = OlderThan::new(100);
        assert!(filter.check(&Record::new(99, vec![])));
        assert!(!filter.check(&Record::new(100, vec![])));
        assert_eq!(filter.span(), None);
    }

    #[test]
    fn bucket_sizes() {
        let day = 86_400;
        assert_eq!(bucket_size(day / 2), None);
        assert_eq!(bucket_size(day), None);
        assert_eq!(bucket_size(2 * day), Some(5));
        assert_eq!(bucket_size(7 * day), Some(5));
        assert_eq!(bucket_size(8 * day), Some(10));
        assert_eq!(bucket_size(30 * day), Some(25));
    }
}
