//! Suspicious address set
//!
//! An address moves from clean to flagged the first time a critical alert, a
//! flag escalation or a governance anomaly names it. Under the default
//! `FlagExpiry::Permanent` policy nothing ever moves it back; clearing a flag
//! is left to manual review outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::monitor::clock::{secs_span, window_start};

use crate::monitor::config::ReputationConfig;
use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::events::normalize_address;

/// How long a flag stays in force
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FlagExpiry {
    #[default]
    Permanent,
    AfterSecs { secs: u64 },
}

impl FlagExpiry {
    fn is_expired(&self, record: &FlagRecord, now: DateTime<Utc>) -> bool {
        match self {
            Self::Permanent => false,
            Self::AfterSecs { secs } => record.flagged_at <= window_start(now, secs_span(*secs)),
        }
    }
}

/// Why and when an address was flagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub flagged_at: DateTime<Utc>,
    pub reason: String,
    pub event_id: Uuid,
}

/// Result of a flag request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagOutcome {
    NewlyFlagged,
    AlreadyFlagged,
    /// Flagged, but the set was full and the oldest flag was dropped
    NewlyFlaggedWithEviction { evicted: String },
}

#[derive(Debug)]
pub struct SuspiciousAddressSet {
    entries: HashMap<String, FlagRecord>,
    by_flagged_at: BTreeSet<(DateTime<Utc>, String)>,
    max_entries: usize,
    expiry: FlagExpiry,
}

impl SuspiciousAddressSet {
    pub fn new(max_entries: usize, expiry: FlagExpiry) -> Self {
        Self { entries: HashMap::new(), by_flagged_at: BTreeSet::new(), max_entries, expiry }
    }

    pub fn from_config(config: &ReputationConfig) -> Self {
        Self::new(config.max_suspicious, config.expiry)
    }

    pub fn flag(
        &mut self,
        address: &str,
        reason: &str,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<FlagOutcome> {
        let address = normalize_address(address);
        if address.is_empty() {
            return Err(MonitorError::MissingField("address"));
        }
        if self.max_entries == 0 {
            return Err(MonitorError::CapacityFull { max_size: 0 });
        }

        if let Some(existing) = self.entries.get(&address) {
            if !self.expiry.is_expired(existing, now) {
                return Ok(FlagOutcome::AlreadyFlagged);
            }
        }

        let mut outcome = FlagOutcome::NewlyFlagged;
        if !self.entries.contains_key(&address) && self.entries.len() >= self.max_entries {
            if let Some((_, evicted)) = self.by_flagged_at.pop_first() {
                self.entries.remove(&evicted);
                outcome = FlagOutcome::NewlyFlaggedWithEviction { evicted };
            }
        }

        let record = FlagRecord { flagged_at: now, reason: reason.to_string(), event_id };
        if let Some(previous) = self.entries.insert(address.clone(), record) {
            self.by_flagged_at.remove(&(previous.flagged_at, address.clone()));
        }
        self.by_flagged_at.insert((now, address));
        Ok(outcome)
    }

    pub fn contains(&self, address: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&normalize_address(address))
            .is_some_and(|record| !self.expiry.is_expired(record, now))
    }

    pub fn get(&self, address: &str) -> Option<&FlagRecord> {
        self.entries.get(&normalize_address(address))
    }

    /// Remove flags the expiry policy no longer honours. Always 0 when permanent.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        while let Some((_, address)) = self.by_flagged_at.first() {
            let expired = self
                .entries
                .get(address)
                .map_or(true, |record| self.expiry.is_expired(record, now));
            if !expired {
                break;
            }
            if let Some((_, address)) = self.by_flagged_at.pop_first() {
                self.entries.remove(&address);
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.entries.keys().cloned().collect();
        addresses.sort();
        addresses
    }
}

impl Default for SuspiciousAddressSet {
    fn default() -> Self {
        Self::from_config(&ReputationConfig::default())
    }
}
