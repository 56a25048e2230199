//! Sliding-window rate limiter
//!
//! Counts recent events per (rule, address) over a trailing window. Windows
//! are pruned lazily on every access, so a window only ever holds timestamps
//! newer than `now - time_window`. The table itself is bounded: idle entries
//! expire after a TTL and the least recently touched entry is evicted once
//! `max_tracked` is reached. A `(last_seen, key)` index keeps both of those
//! from scanning the whole table.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

use crate::monitor::clock::{secs_span, window_start};
use crate::monitor::config::RateLimitConfig;
use crate::monitor::events::normalize_address;
use crate::monitor::rules::WindowParams;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct WindowKey {
    rule: String,
    address: String,
}

#[derive(Debug)]
struct TrackedWindow {
    timestamps: VecDeque<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

impl TrackedWindow {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        self.timestamps.retain(|ts| *ts > cutoff);
    }
}

/// Per-address trailing-window counter
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: HashMap<WindowKey, TrackedWindow>,
    by_last_seen: BTreeSet<(DateTime<Utc>, WindowKey)>,
    max_tracked: usize,
    idle_ttl: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(max_tracked: usize, idle_ttl: Duration) -> Self {
        Self {
            windows: HashMap::with_capacity(max_tracked.min(10_000)),
            by_last_seen: BTreeSet::new(),
            max_tracked: max_tracked.max(1),
            idle_ttl,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_tracked_addresses, secs_span(config.idle_ttl_secs))
    }

    /// Record one event at `now` and return how many events the window holds,
    /// this one included. Without window parameters the conservative default
    /// applies.
    pub fn record(
        &mut self,
        rule_id: &str,
        address: &str,
        window: Option<&WindowParams>,
        now: DateTime<Utc>,
    ) -> usize {
        let params = window.copied().unwrap_or(WindowParams::CONSERVATIVE);
        let key = WindowKey { rule: rule_id.to_string(), address: normalize_address(address) };

        if !self.windows.contains_key(&key) && self.windows.len() >= self.max_tracked {
            self.evict_least_recent();
        }

        let entry = self.windows.entry(key.clone()).or_insert_with(|| TrackedWindow {
            timestamps: VecDeque::new(),
            last_seen: now,
        });
        self.by_last_seen.remove(&(entry.last_seen, key.clone()));
        entry.prune(window_start(now, params.time_window()));
        entry.timestamps.push_back(now);
        entry.last_seen = now;
        let count = entry.timestamps.len();
        self.by_last_seen.insert((now, key));
        count
    }

    /// Count without recording
    pub fn current_count(
        &self,
        rule_id: &str,
        address: &str,
        window: Option<&WindowParams>,
        now: DateTime<Utc>,
    ) -> usize {
        let params = window.copied().unwrap_or(WindowParams::CONSERVATIVE);
        let key = WindowKey { rule: rule_id.to_string(), address: normalize_address(address) };
        let cutoff = window_start(now, params.time_window());
        self.windows
            .get(&key)
            .map(|w| w.timestamps.iter().filter(|ts| **ts > cutoff).count())
            .unwrap_or(0)
    }

    /// Drop windows untouched for longer than the idle TTL
    pub fn prune_idle(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = window_start(now, self.idle_ttl);
        let mut removed = 0;
        while let Some((last_seen, _)) = self.by_last_seen.first() {
            if *last_seen >= cutoff {
                break;
            }
            if let Some((_, key)) = self.by_last_seen.pop_first() {
                self.windows.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    fn evict_least_recent(&mut self) {
        if let Some((_, key)) = self.by_last_seen.pop_first() {
            debug!(rule = %key.rule, address = %key.address, "Evicting least recently used rate window");
            self.windows.remove(&key);
        }
    }

    /// Number of (rule, address) windows currently tracked
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
