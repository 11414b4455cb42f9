//! Time-bounded suppression of repeated change notifications.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};

/// Remembers recently admitted paths for a fixed retention interval.
///
/// Entries are kept in admission order, so the front is always the oldest.
/// Expired entries are evicted lazily at the start of every admission.
#[derive(Debug, Clone)]
pub struct DebounceWindow {
    entries: VecDeque<(Instant, Utf8PathBuf)>,
    retention: Duration,
}

impl DebounceWindow {
    /// Create an empty window that retains entries for `retention`.
    #[must_use]
    pub const fn new(retention: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            retention,
        }
    }

    /// Return the retention interval.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Return the number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether no entry is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Admit `key` now. See [`Self::admit_at`].
    pub fn admit(&mut self, key: &Utf8Path) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// Admit `key` at `now`, returning `false` when it is a duplicate.
    ///
    /// Entries whose age has reached the retention interval are evicted
    /// first. `now` is expected not to go backwards between calls.
    pub fn admit_at(&mut self, key: &Utf8Path, now: Instant) -> bool {
        while self
            .entries
            .front()
            .is_some_and(|(admitted, _)| now.saturating_duration_since(*admitted) >= self.retention)
        {
            self.entries.pop_front();
        }

        if self.entries.iter().any(|(_, retained)| retained == key) {
            return false;
        }
        self.entries.push_back((now, key.to_path_buf()));
        true
    }
}
