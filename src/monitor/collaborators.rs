//! Outbound collaborators consumed by the monitor
//!
//! Notification delivery and threat intelligence live outside this crate.
//! The defaults here only log or answer from a local set.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::monitor::errors::Result;
use crate::monitor::events::{normalize_address, SecurityEvent};

/// Security-team notification channel
#[async_trait]
pub trait SecurityNotifier: Send + Sync {
    fn name(&self) -> &str {
        "notifier"
    }

    async fn notify(&self, event: &SecurityEvent) -> Result<()>;
}

/// External blacklist lookup
#[async_trait]
pub trait BlacklistLookup: Send + Sync {
    fn name(&self) -> &str {
        "blacklist"
    }

    /// Returns the subset of `addresses` that are blacklisted
    async fn check_blacklist(&self, addresses: &[String]) -> Result<Vec<String>>;
}

/// Logs high-risk events instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl SecurityNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log-notifier"
    }

    async fn notify(&self, event: &SecurityEvent) -> Result<()> {
        let alert_types: Vec<&str> = event.alerts.iter().map(|a| a.alert_type.as_str()).collect();
        warn!(
            event_id = %event.id,
            address = %event.address,
            risk_score = event.risk_score,
            risk_level = ?event.risk_level,
            alerts = ?alert_types,
            "High-risk security event for the security team"
        );
        Ok(())
    }
}

/// Lookup that never reports anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBlacklist;

#[async_trait]
impl BlacklistLookup for NoBlacklist {
    fn name(&self) -> &str {
        "no-blacklist"
    }

    async fn check_blacklist(&self, _addresses: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// In-memory blacklist
#[derive(Debug, Default, Clone)]
pub struct StaticBlacklist {
    entries: HashSet<String>,
}

impl StaticBlacklist {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { entries: addresses.into_iter().map(|a| normalize_address(a.as_ref())).collect() }
    }

    pub fn insert(&mut self, address: &str) {
        self.entries.insert(normalize_address(address));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BlacklistLookup for StaticBlacklist {
    fn name(&self) -> &str {
        "static-blacklist"
    }

    async fn check_blacklist(&self, addresses: &[String]) -> Result<Vec<String>> {
        Ok(addresses
            .iter()
            .map(|a| normalize_address(a))
            .filter(|a| self.entries.contains(a))
            .collect())
    }
}

/// The set of collaborators an engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn SecurityNotifier>,
    pub blacklist: Arc<dyn BlacklistLookup>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            audit: Arc::new(TracingAuditSink),
            notifier: Arc::new(LogNotifier),
            blacklist: Arc::new(NoBlacklist),
        }
    }
}

impl Collaborators {
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SecurityNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_blacklist(mut self, blacklist: Arc<dyn BlacklistLookup>) -> Self {
        self.blacklist = blacklist;
        self
    }
}
