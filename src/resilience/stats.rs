//! Bounded error log and counters.

use std::collections::{BTreeMap, VecDeque};
use parking_lot::Mutex;
use serde::Serialize;

use crate::resilience::classify::{ErrorCategory, ErrorInfo, Priority};

/// How many recent errors [`ErrorLog::stats`] returns.
const RECENT_IN_STATS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    pub total: u64,
    pub recoverable: u64,
    pub unrecoverable: u64,
    pub recovered: u64,
    pub gave_up: u64,
    pub by_category: BTreeMap<ErrorCategory, u64>,
    pub by_priority: BTreeMap<Priority, u64>,
    pub recent: Vec<ErrorInfo>,
}

#[derive(Debug, Default)]
struct Inner {
    ring: VecDeque<ErrorInfo>,
    capacity: usize,
    stats: ErrorStats,
}

#[derive(Debug)]
pub struct ErrorLog {
    inner: Mutex<Inner>,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::new(),
                capacity: capacity.max(1),
                stats: ErrorStats::default(),
            }),
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = capacity.max(1);
        while inner.ring.len() > inner.capacity {
            inner.ring.pop_front();
        }
    }

    pub fn record(&self, info: &ErrorInfo) {
        let mut inner = self.inner.lock();
        let stats = &mut inner.stats;
        stats.total += 1;
        if info.is_recoverable {
            stats.recoverable += 1;
        } else {
            stats.unrecoverable += 1;
        }
        *stats.by_category.entry(info.category).or_insert(0) += 1;
        *stats.by_priority.entry(info.priority).or_insert(0) += 1;

        inner.ring.push_back(info.clone());
        while inner.ring.len() > inner.capacity {
            inner.ring.pop_front();
        }
    }

    /// Count the end of a recovery sequence.
    pub fn record_resolution(&self, recovered: bool) {
        let mut inner = self.inner.lock();
        if recovered {
            inner.stats.recovered += 1;
        } else {
            inner.stats.gave_up += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().ring.is_empty()
    }

    pub fn stats(&self) -> ErrorStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        let skip = inner.ring.len().saturating_sub(RECENT_IN_STATS);
        stats.recent = inner.ring.iter().skip(skip).cloned().collect();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::resilience::classify::{ErrorClassifier, ErrorContext, RawError};
    use std::sync::Arc;

    #[test]
    fn test_counters_and_ring() {
        let classifier = ErrorClassifier::new(Arc::new(ManualClock::new(0)));
        let log = ErrorLog::new(3);

        for message in ["ECONNRESET", "ECONNRESET", "invalid date", "EACCES", "timeout"] {
            log.record(&classifier.classify(&RawError::new(message), &ErrorContext::new("op")));
        }
        log.record_resolution(true);
        log.record_resolution(false);

        let stats = log.stats();
        assert_eq!(log.len(), 3);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.unrecoverable, 1);
        assert_eq!(stats.by_category.get(&ErrorCategory::Network), Some(&3));
        assert_eq!(stats.by_category.get(&ErrorCategory::Validation), Some(&1));
        assert_eq!(stats.recovered, 1);
        assert_eq!(stats.gave_up, 1);
        assert_eq!(stats.recent.len(), 3);
        assert_eq!(stats.recent[2].message, "timeout");
    }
}
