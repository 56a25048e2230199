use chrono::{DateTime, Duration, Utc};
use donation_sentinel::monitor::rules::ids as rule_ids;
use donation_sentinel::monitor::{
    EventStore, GovernanceAction, InboundMessage, ManualClock, MemoryEventStore, MonitorConfig,
    MonitorError, MonitorService, Proposal, Result, SecurityEngine, SecurityEvent,
    TransactionEvent,
};
use std::sync::Arc;

fn service() -> MonitorService {
    let engine = SecurityEngine::with_config(MonitorConfig::default()).unwrap();
    MonitorService::spawn(Arc::new(engine))
}

#[tokio::test]
async fn test_jsonl_messages_flow_through_handle() {
    let service = service();
    let handle = service.handle();

    let lines = [
        r#"{"kind":"transaction","hash":"0x1","from":"0xA","to":"0xB","value":"12.5","gas_price":1000000000,"data":"0x"}"#,
        r#"{"kind":"transaction","hash":"0x2","from":"0xA","to":"0xB","value":"1","status":"failed"}"#,
        r#"{"kind":"governance","proposal":{"id":"p1","proposer":"0xC"},"action":"create"}"#,
        r#"{"kind":"governance","proposal":{"id":"p1","proposer":"0xD"},"action":"vote"}"#,
    ];
    for line in lines {
        let message: InboundMessage = serde_json::from_str(line).unwrap();
        handle.submit(message).await.unwrap();
    }

    let dashboard = handle.dashboard().await.unwrap();
    assert_eq!(dashboard.metrics.total_events, 4);
    assert_eq!(dashboard.summary.alerts_by_type.get(rule_ids::LARGE_DONATION), Some(&1));

    let report = handle.address_report("0xa").await.unwrap();
    assert_eq!(report.total_events, 2);
    assert!(!report.is_suspicious);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_producers_are_serialized() {
    let service = service();

    let mut tasks = Vec::new();
    for n in 0..8 {
        let handle = service.handle();
        tasks.push(tokio::spawn(async move {
            handle
                .monitor_transaction(TransactionEvent {
                    hash: format!("0x{}", n),
                    from: "0xsame".into(),
                    to: "0xcampaign".into(),
                    value: "1".into(),
                    ..Default::default()
                })
                .await
        }));
    }

    let mut rapid = 0;
    for task in tasks {
        let event = task.await.unwrap().unwrap();
        if event.has_alert(rule_ids::RAPID_DONATIONS) {
            rapid += 1;
        }
    }
    // events 6, 7 and 8 exceed max_count = 5
    assert_eq!(rapid, 3);
    assert_eq!(service.engine().event_count(), 8);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_input_returns_error_to_caller() {
    let service = service();
    let handle = service.handle();

    let err = handle
        .monitor_governance(Proposal { id: "p".into(), proposer: "".into(), title: None }, GovernanceAction::Create)
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::MissingField(_)));

    let report = handle.sweep().await.unwrap();
    assert_eq!(report.events_removed, 0);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handle_fails_after_shutdown() {
    let service = service();
    let handle = service.handle();
    service.shutdown().await.unwrap();

    let result = handle
        .monitor_transaction(TransactionEvent {
            hash: "0x1".into(),
            from: "0xa".into(),
            to: "0xb".into(),
            value: "1".into(),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(MonitorError::ChannelClosed)));
}

fn donation(hash: &str, from: &str) -> TransactionEvent {
    TransactionEvent {
        hash: hash.into(),
        from: from.into(),
        to: "0xcampaign".into(),
        value: "1".into(),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_sweep_timer_prunes_expired_events() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut config = MonitorConfig::default();
    config.retention.sweep_interval_secs = 60;
    let engine = SecurityEngine::builder(config).with_clock(clock.clone()).build().unwrap();
    let service = MonitorService::spawn(Arc::new(engine));
    let handle = service.handle();

    handle.monitor_transaction(donation("0x1", "0xold")).await.unwrap();
    assert_eq!(handle.address_report("0xold").await.unwrap().total_events, 1);

    clock.advance(Duration::days(31));
    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    for _ in 0..10 {
        if service.engine().event_count() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let report = handle.address_report("0xold").await.unwrap();
    assert_eq!(report.total_events, 0);
    assert_eq!(handle.dashboard().await.unwrap().metrics.total_events, 1);
    service.shutdown().await.unwrap();
}

/// Store whose retention pass blows up
struct BrokenPruneStore(MemoryEventStore);

impl EventStore for BrokenPruneStore {
    fn append(&mut self, event: SecurityEvent) -> Result<()> {
        self.0.append(event)
    }

    fn iter(&self) -> Box<dyn DoubleEndedIterator<Item = &SecurityEvent> + '_> {
        self.0.iter()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn prune_older_than(&mut self, _cutoff: DateTime<Utc>) -> usize {
        panic!("storage backend corrupted")
    }

    fn clear(&mut self) {
        self.0.clear()
    }
}

#[tokio::test]
async fn test_crashed_service_task_reports_task_failure() {
    let engine = SecurityEngine::builder(MonitorConfig::default())
        .with_store(Box::new(BrokenPruneStore(MemoryEventStore::new(100))))
        .build()
        .unwrap();
    let service = MonitorService::spawn(Arc::new(engine));
    let handle = service.handle();

    handle.monitor_transaction(donation("0x1", "0xa")).await.unwrap();
    assert!(matches!(handle.sweep().await, Err(MonitorError::ChannelClosed)));

    let err = service.shutdown().await.unwrap_err();
    assert!(matches!(err, MonitorError::ServiceTask(_)), "unexpected error: {}", err);
    assert!(err.is_critical());
}
