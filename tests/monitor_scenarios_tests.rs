//! End-to-end scoring scenarios driven through the engine with a manual clock

use chrono::{Duration, TimeZone, Utc};
use donation_sentinel::monitor::patterns::ids as pattern_ids;
use donation_sentinel::monitor::rules::ids as rule_ids;
use donation_sentinel::monitor::{
    GovernanceAction, ManualClock, MonitorConfig, Proposal, RiskLevel, SecurityEngine, Severity,
    TransactionEvent,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn engine() -> (SecurityEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = SecurityEngine::builder(MonitorConfig::default())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    (engine, clock)
}

fn donation(n: usize, from: &str, value: &str) -> TransactionEvent {
    TransactionEvent {
        hash: format!("0x{:064x}", n),
        from: from.to_string(),
        to: "0xcampaign".to_string(),
        value: value.to_string(),
        gas_price: 30_000_000_000,
        data: "0x".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn large_donation_adds_thirty() {
    let (engine, _) = engine();
    let event = engine.monitor_transaction(donation(1, "0xdonor", "15")).await.unwrap();

    assert_eq!(event.alerts.len(), 1);
    assert_eq!(event.alerts[0].alert_type, rule_ids::LARGE_DONATION);
    assert_eq!(event.alerts[0].severity, Severity::Medium);
    assert_eq!(event.risk_score, 30);
    assert_eq!(event.risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn sixth_donation_in_five_minutes_is_rapid() {
    let (engine, clock) = engine();

    for n in 0..5 {
        let event = engine.monitor_transaction(donation(n, "0xA", "1")).await.unwrap();
        assert!(!event.has_alert(rule_ids::RAPID_DONATIONS), "event {} alerted early", n + 1);
        clock.advance(Duration::seconds(30));
    }
    assert!(!engine.is_suspicious("0xa"));

    let sixth = engine.monitor_transaction(donation(5, "0xA", "1")).await.unwrap();
    assert!(sixth.has_alert(rule_ids::RAPID_DONATIONS));
    assert_eq!(sixth.risk_score, 50);
    assert_eq!(sixth.risk_level, RiskLevel::Medium);
    assert!(engine.is_suspicious("0xa"));
}

#[tokio::test]
async fn donations_spread_past_the_window_do_not_alert() {
    let (engine, clock) = engine();
    for n in 0..10 {
        let event = engine.monitor_transaction(donation(n, "0xslow", "1")).await.unwrap();
        assert!(!event.has_alert(rule_ids::RAPID_DONATIONS));
        clock.advance(Duration::seconds(61));
    }
}

#[tokio::test]
async fn flash_loan_selector_runs_critical_handling() {
    let (engine, _) = engine();
    let mut tx = donation(1, "0xlender", "1");
    tx.data = "0x5cffe9de0000000000000000000000000000000000000000000000000000000000000001".into();

    let event = engine.monitor_transaction(tx).await.unwrap();
    assert!(event.has_alert(pattern_ids::FLASH_LOAN));
    assert_eq!(event.alerts[0].severity, Severity::Critical);
    assert_eq!(event.risk_score, 80);
    assert_eq!(event.risk_level, RiskLevel::Critical);

    assert!(engine.is_suspicious("0xlender"));
    let metrics = engine.metrics();
    assert_eq!(metrics.blocked_transactions, 1);
    assert_eq!(metrics.suspicious_activity, 1);
}

#[tokio::test]
async fn approval_farming_is_medium() {
    let (engine, _) = engine();
    let mut tx = donation(1, "0xfarmer", "0");
    tx.data = "0x095ea7b3".into();

    let event = engine.monitor_transaction(tx).await.unwrap();
    assert!(event.has_alert(pattern_ids::APPROVAL_FARMING));
    assert_eq!(event.risk_score, 40);
    assert!(!engine.is_suspicious("0xfarmer"));
}

#[tokio::test]
async fn stacked_alerts_clamp_at_one_hundred() {
    let (engine, _) = engine();
    let mut tx = donation(1, "0xwhale", "500");
    tx.gas_price = 500_000_000_000;
    tx.data = "0xab9c4b5d".into();

    let event = engine.monitor_transaction(tx).await.unwrap();
    assert_eq!(event.alerts.len(), 3);
    assert_eq!(event.risk_score, 100);
    assert_eq!(event.risk_level, RiskLevel::Critical);
}

#[tokio::test]
async fn third_proposal_in_an_hour_flags_proposer() {
    let (engine, clock) = engine();

    for n in 0..2 {
        let proposal = Proposal { id: format!("p{}", n), proposer: "0xGov".into(), title: None };
        let event = engine.monitor_governance(proposal, GovernanceAction::Create).await.unwrap();
        assert!(event.alerts.is_empty());
        clock.advance(Duration::minutes(10));
    }

    let proposal = Proposal { id: "p2".into(), proposer: "0xgov".into(), title: Some("again".into()) };
    let event = engine.monitor_governance(proposal, GovernanceAction::Create).await.unwrap();
    assert!(event.has_alert(rule_ids::GOVERNANCE_MANIPULATION));
    assert_eq!(event.risk_score, 80);
    assert!(engine.is_suspicious("0xgov"));
}

#[tokio::test]
async fn proposals_outside_the_hour_do_not_count() {
    let (engine, clock) = engine();
    for n in 0..4 {
        let proposal = Proposal { id: format!("p{}", n), proposer: "0xgov".into(), title: None };
        let event = engine.monitor_governance(proposal, GovernanceAction::Create).await.unwrap();
        assert!(event.alerts.is_empty());
        clock.advance(Duration::minutes(31));
    }
}

#[tokio::test]
async fn flagged_address_stays_suspicious() {
    let (engine, clock) = engine();
    let mut tx = donation(1, "0xbad", "1");
    tx.data = "0x42b0b77c".into();
    engine.monitor_transaction(tx).await.unwrap();

    for day in 0..3 {
        clock.advance(Duration::days(20));
        engine.sweep();
        let report = engine.address_report("0xBAD");
        assert!(report.is_suspicious, "flag lost after {} sweeps", day + 1);
    }
}

#[tokio::test]
async fn retention_removes_exactly_the_expired_events() {
    let (engine, clock) = engine();

    let mut kept = Vec::new();
    for n in 0..6 {
        let event = engine.monitor_transaction(donation(n, "0xr", "1")).await.unwrap();
        if n >= 3 {
            kept.push(event.id);
        }
        clock.advance(Duration::days(10));
    }
    // Now 60 days after the first event; the horizon keeps the last 30 days.
    let report = engine.sweep();

    let mut remaining: Vec<_> = engine.recent_events(100).into_iter().map(|e| e.id).collect();
    remaining.reverse();
    assert_eq!(report.events_removed, 3);
    assert_eq!(remaining, kept);
}

#[tokio::test]
async fn dashboard_and_report_reflect_activity() {
    let (engine, _) = engine();
    engine.monitor_transaction(donation(1, "0xa", "15")).await.unwrap();
    engine.monitor_transaction(donation(2, "0xb", "1")).await.unwrap();

    let dashboard = engine.dashboard();
    assert_eq!(dashboard.metrics.total_events, 2);
    assert_eq!(dashboard.metrics.alerts, 1);
    assert_eq!(dashboard.summary.last_24h.events, 2);
    assert_eq!(dashboard.summary.alerts_by_type.get(rule_ids::LARGE_DONATION), Some(&1));
    assert_eq!(dashboard.recent_alerts.len(), 1);

    let report = engine.address_report("0xcampaign");
    assert_eq!(report.total_events, 2);
    assert_eq!(report.total_alerts, 1);
    assert_eq!(report.average_risk_score, 15.0);
}
