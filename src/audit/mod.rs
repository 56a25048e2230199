//! Audit trail for raised alerts
//!
//! Every alert on a scored event becomes one `AuditEntry` handed to an
//! `AuditSink`. Sinks are external collaborators; the monitor never lets a
//! sink failure affect the event that produced the entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::monitor::errors::Result;
use crate::monitor::events::{Alert, SecurityEvent};
use crate::monitor::rules::Severity;

pub mod logging;

pub use logging::TracingAuditSink;

/// Structured audit record for one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub address: String,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub risk_score: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, Value>,
}

impl AuditEntry {
    pub fn from_alert(event: &SecurityEvent, alert: &Alert) -> Self {
        Self {
            event_id: event.id,
            timestamp: event.timestamp,
            address: event.address.clone(),
            alert_type: alert.alert_type.clone(),
            severity: alert.severity,
            message: alert.message.clone(),
            risk_score: event.risk_score,
            payload: alert.payload.clone(),
        }
    }
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str {
        "audit"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<()>;
}
