//! Ingestion service
//!
//! A single task owns the receive side of a bounded request channel and a
//! sweep timer. Producers talk to it through cloneable `MonitorHandle`s and
//! get their answers back on oneshot channels.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::monitor::engine::{SecurityEngine, SweepReport};
use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::events::{
    GovernanceAction, InboundMessage, Proposal, SecurityEvent, TransactionEvent,
};
use crate::monitor::reporting::{AddressReport, Dashboard};

pub enum MonitorRequest {
    Transaction {
        event: TransactionEvent,
        reply: oneshot::Sender<Result<SecurityEvent>>,
    },
    Governance {
        proposal: Proposal,
        action: GovernanceAction,
        reply: oneshot::Sender<Result<SecurityEvent>>,
    },
    Dashboard {
        reply: oneshot::Sender<Dashboard>,
    },
    AddressReport {
        address: String,
        reply: oneshot::Sender<AddressReport>,
    },
    Sweep {
        reply: oneshot::Sender<SweepReport>,
    },
}

/// Producer side of the service
#[derive(Clone)]
pub struct MonitorHandle {
    requests: mpsc::Sender<MonitorRequest>,
}

impl MonitorHandle {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> MonitorRequest) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.requests.send(build(tx)).await.map_err(|_| MonitorError::ChannelClosed)?;
        rx.await.map_err(|_| MonitorError::ChannelClosed)
    }

    pub async fn monitor_transaction(&self, event: TransactionEvent) -> Result<SecurityEvent> {
        self.call(|reply| MonitorRequest::Transaction { event, reply }).await?
    }

    pub async fn monitor_governance(
        &self,
        proposal: Proposal,
        action: GovernanceAction,
    ) -> Result<SecurityEvent> {
        self.call(|reply| MonitorRequest::Governance { proposal, action, reply }).await?
    }

    /// Route one replay-feed message
    pub async fn submit(&self, message: InboundMessage) -> Result<SecurityEvent> {
        match message {
            InboundMessage::Transaction(event) => self.monitor_transaction(event).await,
            InboundMessage::Governance { proposal, action } => {
                self.monitor_governance(proposal, action).await
            }
        }
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        self.call(|reply| MonitorRequest::Dashboard { reply }).await
    }

    pub async fn address_report(&self, address: &str) -> Result<AddressReport> {
        let address = address.to_string();
        self.call(|reply| MonitorRequest::AddressReport { address, reply }).await
    }

    /// Run a retention sweep now instead of waiting for the timer
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.call(|reply| MonitorRequest::Sweep { reply }).await
    }
}

pub struct MonitorService {
    engine: Arc<SecurityEngine>,
    handle: MonitorHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorService {
    pub fn spawn(engine: Arc<SecurityEngine>) -> Self {
        let capacity = engine.config().service.channel_capacity.max(1);
        let sweep_every = Duration::from_secs(engine.config().retention.sweep_interval_secs.max(1));

        let (requests, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(engine.clone(), rx, cancel.clone(), sweep_every));

        info!(capacity, sweep_secs = sweep_every.as_secs(), "Monitor service started");
        Self { engine, handle: MonitorHandle { requests }, cancel, task }
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    pub fn engine(&self) -> &Arc<SecurityEngine> {
        &self.engine
    }

    /// Stop the service loop and wait for pending audit entries and notifications
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.map_err(|e| MonitorError::ServiceTask(e.to_string()))?;
        self.engine.flush().await?;
        info!("Monitor service stopped");
        Ok(())
    }
}

async fn run(
    engine: Arc<SecurityEngine>,
    mut rx: mpsc::Receiver<MonitorRequest>,
    cancel: CancellationToken,
    sweep_every: Duration,
) {
    let mut sweep = interval_at(Instant::now() + sweep_every, sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Monitor service cancelled");
                break;
            }
            request = rx.recv() => {
                let Some(request) = request else {
                    debug!("All monitor handles dropped");
                    break;
                };
                handle_request(&engine, request).await;
            }
            _ = sweep.tick() => {
                engine.sweep();
            }
        }
    }
}

async fn handle_request(engine: &SecurityEngine, request: MonitorRequest) {
    // A dropped receiver means the caller stopped waiting; nothing to do.
    match request {
        MonitorRequest::Transaction { event, reply } => {
            let _ = reply.send(engine.monitor_transaction(event).await);
        }
        MonitorRequest::Governance { proposal, action, reply } => {
            let _ = reply.send(engine.monitor_governance(proposal, action).await);
        }
        MonitorRequest::Dashboard { reply } => {
            let _ = reply.send(engine.dashboard());
        }
        MonitorRequest::AddressReport { address, reply } => {
            let _ = reply.send(engine.address_report(&address));
        }
        MonitorRequest::Sweep { reply } => {
            let _ = reply.send(engine.sweep());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::config::MonitorConfig;

    #[tokio::test]
    async fn test_handle_round_trip_and_shutdown() {
        let engine = Arc::new(SecurityEngine::with_config(MonitorConfig::default()).unwrap());
        let service = MonitorService::spawn(engine);
        let handle = service.handle();

        let event = handle
            .monitor_transaction(TransactionEvent {
                hash: "0x1".into(),
                from: "0xa".into(),
                to: "0xb".into(),
                value: "20".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(event.risk_score, 30);

        let dashboard = handle.dashboard().await.unwrap();
        assert_eq!(dashboard.metrics.total_events, 1);

        service.shutdown().await.unwrap();
        assert!(matches!(handle.dashboard().await, Err(MonitorError::ChannelClosed)));
    }
}
