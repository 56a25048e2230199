//! Read-only projections over the event store
//!
//! Nothing here mutates monitor state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::monitor::event_store::EventStore;
use crate::monitor::events::{normalize_address, SecurityEvent};
use crate::monitor::metrics::SecurityMetrics;
use crate::monitor::reputation::SuspiciousAddressSet;

pub const RECENT_ALERTS_LIMIT: usize = 10;
pub const ADDRESS_ACTIVITY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub events: usize,
    pub alerts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub last_24h: WindowCounts,
    pub last_7d: WindowCounts,
    pub alerts_by_type: BTreeMap<String, usize>,
    pub alerts_by_severity: BTreeMap<String, usize>,
    pub suspicious_addresses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub metrics: SecurityMetrics,
    pub summary: DashboardSummary,
    /// Most recent alert-bearing events, newest first
    pub recent_alerts: Vec<SecurityEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressReport {
    pub address: String,
    pub is_suspicious: bool,
    pub total_events: usize,
    pub total_alerts: usize,
    pub average_risk_score: f64,
    pub alerts_by_type: BTreeMap<String, usize>,
    /// Newest first
    pub recent_activity: Vec<SecurityEvent>,
}

pub struct ReportingFacade<'a> {
    store: &'a dyn EventStore,
    reputation: &'a SuspiciousAddressSet,
}

impl<'a> ReportingFacade<'a> {
    pub fn new(store: &'a dyn EventStore, reputation: &'a SuspiciousAddressSet) -> Self {
        Self { store, reputation }
    }

    pub fn dashboard(&self, metrics: SecurityMetrics, now: DateTime<Utc>) -> Dashboard {
        let day_ago = now - Duration::hours(24);
        let week_ago = now - Duration::days(7);

        let mut summary = DashboardSummary::default();
        for event in self.store.iter() {
            let alerts = event.alerts.len();
            if event.timestamp >= day_ago {
                summary.last_24h.events += 1;
                summary.last_24h.alerts += alerts;
            }
            if event.timestamp >= week_ago {
                summary.last_7d.events += 1;
                summary.last_7d.alerts += alerts;
            }
            for alert in &event.alerts {
                *summary.alerts_by_type.entry(alert.alert_type.clone()).or_default() += 1;
                *summary
                    .alerts_by_severity
                    .entry(alert.severity.as_str().to_string())
                    .or_default() += 1;
            }
        }
        summary.suspicious_addresses = self.reputation.len();

        let recent_alerts = self
            .store
            .iter()
            .rev()
            .filter(|event| event.has_alerts())
            .take(RECENT_ALERTS_LIMIT)
            .cloned()
            .collect();

        Dashboard { generated_at: now, metrics, summary, recent_alerts }
    }

    pub fn address_report(&self, address: &str, now: DateTime<Utc>) -> AddressReport {
        let address = normalize_address(address);
        let events: Vec<&SecurityEvent> =
            self.store.iter().filter(|event| event.involves(&address)).collect();

        let total_alerts = events.iter().map(|event| event.alerts.len()).sum();
        let average_risk_score = if events.is_empty() {
            0.0
        } else {
            let total: u64 = events.iter().map(|event| u64::from(event.risk_score)).sum();
            total as f64 / events.len() as f64
        };

        let mut alerts_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for alert in events.iter().flat_map(|event| event.alerts.iter()) {
            *alerts_by_type.entry(alert.alert_type.clone()).or_default() += 1;
        }

        let recent_activity = events
            .iter()
            .rev()
            .take(ADDRESS_ACTIVITY_LIMIT)
            .map(|event| (*event).clone())
            .collect();

        AddressReport {
            is_suspicious: self.reputation.contains(&address, now),
            total_events: events.len(),
            total_alerts,
            average_risk_score,
            alerts_by_type,
            recent_activity,
            address,
        }
    }
}
