//! Alert dispatcher
//!
//! Critical handling (flagging, the advisory blocked counter) runs inline so
//! the event returned to the caller and the reputation set agree. Audit
//! entries and security-team notifications go to a background worker; a
//! collaborator that errors, times out or panics is logged and counted and
//! has no effect on the event. The worker queue is bounded; when it is full
//! the job is dropped and counted rather than stalling ingestion.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEntry, AuditSink};
use crate::monitor::collaborators::SecurityNotifier;
use crate::monitor::config::DispatchConfig;
use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::events::SecurityEvent;
use crate::monitor::metrics::MonitorMetrics;
use crate::monitor::patterns::ids as pattern_ids;
use crate::monitor::reputation::{FlagOutcome, SuspiciousAddressSet};
use crate::monitor::rules::RuleAction;

enum DispatchJob {
    Event { event: SecurityEvent, notify: bool },
    Flush(oneshot::Sender<()>),
}

/// What critical handling did for one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CriticalOutcome {
    pub flagged: bool,
    pub blocked: bool,
}

pub struct AlertDispatcher {
    jobs: mpsc::Sender<DispatchJob>,
    metrics: Arc<MonitorMetrics>,
    notify_threshold: u8,
    auto_block: bool,
    worker: JoinHandle<()>,
}

impl AlertDispatcher {
    /// Start the background worker. Must be called inside a tokio runtime.
    pub fn spawn(
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn SecurityNotifier>,
        metrics: Arc<MonitorMetrics>,
        config: &DispatchConfig,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            MonitorError::Configuration(format!("alert dispatcher needs a tokio runtime: {}", e))
        })?;

        let (jobs, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = runtime.spawn(run_worker(
            rx,
            audit,
            notifier,
            metrics.clone(),
            config.collaborator_timeout(),
        ));

        Ok(Self {
            jobs,
            metrics,
            notify_threshold: config.notify_threshold,
            auto_block: config.auto_block,
            worker,
        })
    }

    /// Flag the subject and count advisory blocks for qualifying alerts.
    ///
    /// Runs under the engine's state lock. A failure to flag is reported but
    /// never fails the event.
    pub fn handle_critical(
        &self,
        event: &SecurityEvent,
        reputation: &mut SuspiciousAddressSet,
        metrics: &MonitorMetrics,
        now: DateTime<Utc>,
    ) -> CriticalOutcome {
        let mut outcome = CriticalOutcome::default();

        let qualifying = event
            .alerts
            .iter()
            .find(|alert| alert.is_critical() || alert.action == RuleAction::FlagAddress);

        if let Some(alert) = qualifying {
            match reputation.flag(&event.address, &alert.alert_type, event.id, now) {
                Ok(FlagOutcome::NewlyFlagged) => {
                    info!(
                        address = %event.address,
                        reason = %alert.alert_type,
                        event_id = %event.id,
                        "Address flagged as suspicious"
                    );
                    outcome.flagged = true;
                }
                Ok(FlagOutcome::AlreadyFlagged) => {
                    debug!(address = %event.address, "Address already flagged");
                    outcome.flagged = true;
                }
                Ok(FlagOutcome::NewlyFlaggedWithEviction { evicted }) => {
                    error!(
                        address = %event.address,
                        evicted = %evicted,
                        "Suspicious address set full, dropped oldest flag"
                    );
                    outcome.flagged = true;
                }
                Err(e) => {
                    error!(address = %event.address, error = %e, "Failed to flag suspicious address");
                }
            }
        }

        if outcome.flagged {
            metrics.record_suspicious_activity();
        }

        if self.auto_block {
            let blocks = event.alerts.iter().any(|alert| {
                alert.alert_type == pattern_ids::FLASH_LOAN || alert.action == RuleAction::Block
            });
            if blocks {
                warn!(address = %event.address, event_id = %event.id, "Transaction marked as blocked");
                metrics.record_blocked();
                outcome.blocked = true;
            }
        }

        outcome
    }

    /// Queue audit entries and, above the threshold, one notification
    pub fn enqueue(&self, event: SecurityEvent) {
        if !event.has_alerts() && event.risk_score < self.notify_threshold {
            return;
        }
        let notify = event.risk_score >= self.notify_threshold;
        let event_id = event.id;
        match self.jobs.try_send(DispatchJob::Event { event, notify }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                error!(
                    event_id = %event_id,
                    capacity = self.jobs.max_capacity(),
                    "Dispatch queue full, dropping audit and notification"
                );
                self.metrics.record_dispatch_dropped();
            }
            Err(TrySendError::Closed(_)) => {
                error!("Alert dispatcher worker is gone, dropping audit and notification");
                self.metrics.record_dispatch_dropped();
            }
        }
    }

    /// Jobs waiting for the worker
    pub fn backlog(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }

    /// Wait until every job queued so far has been handled
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.jobs.send(DispatchJob::Flush(tx)).await.map_err(|_| MonitorError::ChannelClosed)?;
        rx.await.map_err(|_| MonitorError::ChannelClosed)
    }

    pub fn notify_threshold(&self) -> u8 {
        self.notify_threshold
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<DispatchJob>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn SecurityNotifier>,
    metrics: Arc<MonitorMetrics>,
    timeout: Duration,
) {
    while let Some(job) = rx.recv().await {
        match job {
            DispatchJob::Event { event, notify } => {
                for alert in &event.alerts {
                    let entry = AuditEntry::from_alert(&event, alert);
                    let result = guarded(audit.name(), timeout, audit.record(&entry)).await;
                    if let Err(e) = result {
                        warn!(
                            event_id = %event.id,
                            alert_type = %alert.alert_type,
                            error = %e,
                            "Audit sink failed"
                        );
                        metrics.record_collaborator_failure();
                    }
                }

                if notify {
                    let result = guarded(notifier.name(), timeout, notifier.notify(&event)).await;
                    if let Err(e) = result {
                        warn!(event_id = %event.id, error = %e, "Security notifier failed");
                        metrics.record_collaborator_failure();
                    }
                }
            }
            DispatchJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Alert dispatcher worker stopped");
}

/// Run a collaborator call with a timeout, turning panics into errors
pub(crate) async fn guarded<T, F>(name: &str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(MonitorError::collaborator(name, "panicked")),
        Err(_) => Err(MonitorError::Timeout {
            name: name.to_string(),
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        }),
    }
}
