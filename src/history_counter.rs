use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::clock::Clock;

/// Counts occurrences per item inside fixed-width time buckets.
///
/// Keys are `"<bucket>|<item>"` with the bucket stamped as `YYYYMMDDTHHMMSS`,
/// so lexical key order is also age order and [`trim`](Self::trim) can drop
/// the oldest entries first.
pub struct HistoryCounter {
    name: &'static str,
    bucket_size_secs: u64,
    max_len: usize,
    debug_stats: bool,
    clock: Arc<dyn Clock>,
    histogram: Mutex<BTreeMap<String, u64>>,
}

impl HistoryCounter {
    pub fn new(
        name: &'static str,
        bucket_size_secs: u64,
        max_len: usize,
        debug_stats: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        HistoryCounter {
            name,
            bucket_size_secs: bucket_size_secs.max(1),
            max_len,
            debug_stats,
            clock,
            histogram: Mutex::new(BTreeMap::new()),
        }
    }

    /// Increments the count of `item` in the current bucket and returns it.
    pub fn count_and_get(&self, item: &str) -> u64 {
        let key = format!("{}|{}", self.key_date_part(self.clock.now_ms()), item);
        let mut histogram = self.lock();
        let count = histogram.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops the oldest keys until at most `max_len` remain.
    pub fn trim(&self) {
        let mut histogram = self.lock();
        while histogram.len() > self.max_len {
            if histogram.pop_first().is_none() {
                break;
            }
        }
        if self.debug_stats {
            let stats = &*histogram;
            debug!(counter = self.name, ?stats, "history");
        }
    }

    /// Bucket stamp for `ms`, e.g. `20230201T080015` for 15-second buckets.
    pub fn key_date_part(&self, ms: u64) -> String {
        let secs = ms / 1000;
        let bucket = secs - secs % self.bucket_size_secs;
        i64::try_from(bucket)
            .ok()
            .and_then(|b| chrono::DateTime::from_timestamp(b, 0))
            .map(|dt| dt.format("%Y%m%dT%H%M%S").to_string())
            .unwrap_or_else(|| bucket.to_string())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, u64>> {
        self.histogram.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
