use async_trait::async_trait;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditSink};
use crate::monitor::errors::Result;
use crate::monitor::rules::Severity;

/// Writes audit entries as structured `tracing` records under the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing-audit"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        match entry.severity {
            Severity::High | Severity::Critical => {
                warn!(
                    target: "audit",
                    event_id = %entry.event_id,
                    address = %entry.address,
                    alert_type = %entry.alert_type,
                    severity = %entry.severity,
                    risk_score = entry.risk_score,
                    message = %entry.message,
                    "security alert"
                );
            }
            Severity::Low | Severity::Medium => {
                info!(
                    target: "audit",
                    event_id = %entry.event_id,
                    address = %entry.address,
                    alert_type = %entry.alert_type,
                    severity = %entry.severity,
                    risk_score = entry.risk_score,
                    message = %entry.message,
                    "security alert"
                );
            }
        }
        Ok(())
    }
}
