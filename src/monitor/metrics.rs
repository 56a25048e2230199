//! Security metrics
//!
//! Running counters backed by prometheus, readable as a plain snapshot for
//! the dashboard or as text exposition.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::events::SecurityEvent;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub total_events: u64,
    pub alerts: u64,
    pub blocked_transactions: u64,
    pub suspicious_activity: u64,
    pub collaborator_failures: u64,
    /// Audit/notify jobs dropped because the dispatch queue was full
    pub dispatch_dropped: u64,
}

pub struct MonitorMetrics {
    registry: Registry,
    total_events: IntCounter,
    alerts: IntCounter,
    alerts_by_severity: IntCounterVec,
    blocked_transactions: IntCounter,
    suspicious_activity: IntCounter,
    collaborator_failures: IntCounter,
    dispatch_dropped: IntCounter,
}

impl MonitorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let total_events =
            IntCounter::new("sentinel_events_total", "Security events recorded")?;
        let alerts = IntCounter::new("sentinel_alerts_total", "Alerts raised across all events")?;
        let alerts_by_severity = IntCounterVec::new(
            Opts::new("sentinel_alerts_by_severity_total", "Alerts raised, by severity"),
            &["severity"],
        )?;
        let blocked_transactions = IntCounter::new(
            "sentinel_blocked_transactions_total",
            "Transactions counted as blocked by critical handling",
        )?;
        let suspicious_activity = IntCounter::new(
            "sentinel_suspicious_activity_total",
            "Critical handling runs that flagged an address",
        )?;
        let collaborator_failures = IntCounter::new(
            "sentinel_collaborator_failures_total",
            "Audit, notifier or blacklist calls that failed or timed out",
        )?;

        let dispatch_dropped = IntCounter::new(
            "sentinel_dispatch_dropped_total",
            "Audit and notification jobs dropped on a full dispatch queue",
        )?;

        registry.register(Box::new(total_events.clone()))?;
        registry.register(Box::new(alerts.clone()))?;
        registry.register(Box::new(alerts_by_severity.clone()))?;
        registry.register(Box::new(blocked_transactions.clone()))?;
        registry.register(Box::new(suspicious_activity.clone()))?;
        registry.register(Box::new(collaborator_failures.clone()))?;
        registry.register(Box::new(dispatch_dropped.clone()))?;

        Ok(Self {
            registry,
            total_events,
            alerts,
            alerts_by_severity,
            blocked_transactions,
            suspicious_activity,
            collaborator_failures,
            dispatch_dropped,
        })
    }

    pub fn record_event(&self, event: &SecurityEvent) {
        self.total_events.inc();
        self.alerts.inc_by(event.alerts.len() as u64);
        for alert in &event.alerts {
            self.alerts_by_severity.with_label_values(&[alert.severity.as_str()]).inc();
        }
    }

    pub fn record_blocked(&self) {
        self.blocked_transactions.inc();
    }

    pub fn record_suspicious_activity(&self) {
        self.suspicious_activity.inc();
    }

    pub fn record_collaborator_failure(&self) {
        self.collaborator_failures.inc();
    }

    pub fn record_dispatch_dropped(&self) {
        self.dispatch_dropped.inc();
    }

    pub fn snapshot(&self) -> SecurityMetrics {
        SecurityMetrics {
            total_events: self.total_events.get(),
            alerts: self.alerts.get(),
            blocked_transactions: self.blocked_transactions.get(),
            suspicious_activity: self.suspicious_activity.get(),
            collaborator_failures: self.collaborator_failures.get(),
            dispatch_dropped: self.dispatch_dropped.get(),
        }
    }

    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MonitorError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::events::{Alert, EventReference, EventType, RiskLevel};
    use crate::monitor::rules::{RuleAction, Severity};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_record_and_export() {
        let metrics = MonitorMetrics::new().unwrap();
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: EventType::TransactionMonitor,
            timestamp: Utc::now(),
            address: "0xa".into(),
            counterparty: None,
            reference: EventReference::Transaction { hash: "0x1".into() },
            alerts: vec![
                Alert::new("flash_loan", Severity::Critical, RuleAction::Alert, "x"),
                Alert::new("large_donation", Severity::Medium, RuleAction::Alert, "y"),
            ],
            risk_score: 100,
            risk_level: RiskLevel::Critical,
        };

        metrics.record_event(&event);
        metrics.record_blocked();
        metrics.record_collaborator_failure();
        metrics.record_dispatch_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_events, 1);
        assert_eq!(snapshot.alerts, 2);
        assert_eq!(snapshot.blocked_transactions, 1);
        assert_eq!(snapshot.collaborator_failures, 1);
        assert_eq!(snapshot.suspicious_activity, 0);
        assert_eq!(snapshot.dispatch_dropped, 1);

        let exported = metrics.export().unwrap();
        assert!(exported.contains("sentinel_events_total 1"));
        assert!(exported.contains("severity=\"critical\""));
        assert!(exported.contains("sentinel_dispatch_dropped_total 1"));
    }
}
