//! Event store
//!
//! Append-only, insertion-ordered log of scored security events. Retention is
//! applied by an explicit sweep (`prune_older_than`), never on append.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::warn;

use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::events::SecurityEvent;

/// Storage backend for security events
pub trait EventStore: Send {
    /// Append a fully scored event
    fn append(&mut self, event: SecurityEvent) -> Result<()>;

    /// Events oldest first
    fn iter(&self) -> Box<dyn DoubleEndedIterator<Item = &SecurityEvent> + '_>;

    fn len(&self) -> usize;

    /// Remove every event with a timestamp before `cutoff`
    fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize;

    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all(&self) -> Vec<SecurityEvent> {
        self.iter().cloned().collect()
    }

    /// Most recent events first
    fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        self.iter().rev().take(limit).cloned().collect()
    }

    fn since(&self, start: DateTime<Utc>) -> Vec<SecurityEvent> {
        self.iter().filter(|event| event.timestamp >= start).cloned().collect()
    }

    /// Events where the address is subject or counterparty, oldest first
    fn for_address(&self, address: &str) -> Vec<SecurityEvent> {
        self.iter().filter(|event| event.involves(address)).cloned().collect()
    }
}

/// In-memory backend with a hard capacity
pub struct MemoryEventStore {
    events: VecDeque<SecurityEvent>,
    max_events: usize,
}

impl MemoryEventStore {
    pub fn new(max_events: usize) -> Self {
        Self { events: VecDeque::with_capacity(max_events.min(10_000)), max_events }
    }
}

impl EventStore for MemoryEventStore {
    fn append(&mut self, event: SecurityEvent) -> Result<()> {
        if self.max_events == 0 {
            return Err(MonitorError::CapacityFull { max_size: 0 });
        }
        if self.events.len() >= self.max_events {
            if let Some(evicted) = self.events.pop_front() {
                warn!(
                    event_id = %evicted.id,
                    max_events = self.max_events,
                    "Event store at capacity; evicting oldest event before retention horizon"
                );
            }
        }
        self.events.push_back(event);
        Ok(())
    }

    fn iter(&self) -> Box<dyn DoubleEndedIterator<Item = &SecurityEvent> + '_> {
        Box::new(self.events.iter())
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|event| event.timestamp >= cutoff);
        before - self.events.len()
    }

    fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}
