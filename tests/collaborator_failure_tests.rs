//! Collaborator failures and rejected input must never corrupt monitor state

use async_trait::async_trait;
use donation_sentinel::audit::{AuditEntry, AuditSink};
use donation_sentinel::monitor::patterns::ids as pattern_ids;
use donation_sentinel::monitor::{
    BlacklistLookup, Collaborators, MonitorConfig, MonitorError, Result, SecurityEngine,
    SecurityEvent, SecurityNotifier, TransactionEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FailingAudit;

#[async_trait]
impl AuditSink for FailingAudit {
    async fn record(&self, _entry: &AuditEntry) -> Result<()> {
        Err(MonitorError::collaborator("audit", "disk full"))
    }
}

struct PanickingNotifier;

#[async_trait]
impl SecurityNotifier for PanickingNotifier {
    async fn notify(&self, _event: &SecurityEvent) -> Result<()> {
        panic!("notifier bug")
    }
}

struct HangingBlacklist;

#[async_trait]
impl BlacklistLookup for HangingBlacklist {
    async fn check_blacklist(&self, _addresses: &[String]) -> Result<Vec<String>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

struct StuckAudit;

#[async_trait]
impl AuditSink for StuckAudit {
    async fn record(&self, _entry: &AuditEntry) -> Result<()> {
        std::future::pending().await
    }
}

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl SecurityNotifier for CountingNotifier {
    async fn notify(&self, _event: &SecurityEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn flash_loan_tx() -> TransactionEvent {
    TransactionEvent {
        hash: "0xfeed".into(),
        from: "0xattacker".into(),
        to: "0xpool".into(),
        value: "50".into(),
        gas_price: 10_000_000_000,
        data: "0xab9c4b5d".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn failing_collaborators_keep_the_full_score() {
    let mut config = MonitorConfig::default();
    config.dispatch.collaborator_timeout_ms = 50;

    let collaborators = Collaborators::default()
        .with_audit(Arc::new(FailingAudit))
        .with_notifier(Arc::new(PanickingNotifier))
        .with_blacklist(Arc::new(HangingBlacklist));
    let engine = SecurityEngine::builder(config)
        .with_collaborators(collaborators)
        .build()
        .unwrap();

    let event = engine.monitor_transaction(flash_loan_tx()).await.unwrap();
    // large_donation (30) + flash_loan (80), clamped
    assert_eq!(event.risk_score, 100);
    assert!(event.has_alert(pattern_ids::FLASH_LOAN));

    engine.flush().await.unwrap();

    assert_eq!(engine.event_count(), 1);
    assert_eq!(engine.recent_events(1)[0], event);
    assert!(engine.is_suspicious("0xattacker"));

    // blacklist timeout + two audit failures + notifier panic
    let metrics = engine.metrics();
    assert_eq!(metrics.collaborator_failures, 4);
    assert_eq!(metrics.total_events, 1);
}

#[tokio::test]
async fn stuck_audit_sink_keeps_dispatch_queue_bounded() {
    let mut config = MonitorConfig::default();
    config.dispatch.queue_capacity = 4;
    config.dispatch.collaborator_timeout_ms = 60_000;

    let engine = SecurityEngine::builder(config)
        .with_collaborators(Collaborators::default().with_audit(Arc::new(StuckAudit)))
        .build()
        .unwrap();

    for n in 0..20 {
        let mut tx = flash_loan_tx();
        tx.hash = format!("0x{:04x}", n);
        let event = engine.monitor_transaction(tx).await.unwrap();
        assert!(event.has_alert(pattern_ids::FLASH_LOAN));
        assert!(engine.dispatch_backlog() <= 4);
    }

    assert_eq!(engine.event_count(), 20);
    let metrics = engine.metrics();
    assert_eq!(metrics.total_events, 20);
    // at most one job is in the worker's hands, the rest either queue or drop
    assert!(metrics.dispatch_dropped >= 15, "dropped {}", metrics.dispatch_dropped);
    assert!(metrics.dispatch_dropped <= 16, "dropped {}", metrics.dispatch_dropped);
}

#[tokio::test]
async fn notifier_called_once_per_high_risk_event() {
    let notifier = Arc::new(CountingNotifier::default());
    let engine = SecurityEngine::builder(MonitorConfig::default())
        .with_collaborators(Collaborators::default().with_notifier(notifier.clone()))
        .build()
        .unwrap();

    engine.monitor_transaction(flash_loan_tx()).await.unwrap();
    let mut quiet = flash_loan_tx();
    quiet.data = "0x".into();
    quiet.value = "1".into();
    engine.monitor_transaction(quiet).await.unwrap();
    engine.flush().await.unwrap();

    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_input_mutates_nothing() {
    let engine = SecurityEngine::with_config(MonitorConfig::default()).unwrap();

    let cases = vec![
        TransactionEvent { from: String::new(), ..flash_loan_tx() },
        TransactionEvent { value: "lots".into(), ..flash_loan_tx() },
        TransactionEvent { value: "-3".into(), ..flash_loan_tx() },
        TransactionEvent { data: "0xnothex".into(), ..flash_loan_tx() },
        TransactionEvent { hash: "  ".into(), ..flash_loan_tx() },
    ];

    for tx in cases {
        let err = engine.monitor_transaction(tx).await.unwrap_err();
        assert!(err.is_input_error(), "unexpected error {:?}", err);
    }

    assert_eq!(engine.event_count(), 0);
    assert!(!engine.is_suspicious("0xattacker"));
    assert_eq!(engine.metrics().total_events, 0);
    assert!(engine.suspicious_addresses().is_empty());
}
