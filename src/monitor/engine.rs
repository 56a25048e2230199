//! Security engine
//!
//! Orchestrates the data flow for every inbound event: rate windows, threshold
//! rules, pattern detectors, reputation and blacklist checks, scoring, append
//! and dispatch. All mutable state sits in one `MonitorState` behind a single
//! lock; the only awaited call on the scoring path (the blacklist lookup)
//! happens before the lock is taken.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::monitor::clock::{window_start, Clock, SystemClock};
use crate::monitor::collaborators::{BlacklistLookup, Collaborators, StaticBlacklist};
use crate::monitor::config::MonitorConfig;
use crate::monitor::dispatcher::{guarded, AlertDispatcher};
use crate::monitor::errors::Result;
use crate::monitor::event_store::{EventStore, MemoryEventStore};
use crate::monitor::events::{
    Alert, EventReference, EventType, GovernanceAction, Proposal, SecurityEvent,
    TransactionEvent, ValidatedTransaction,
};
use crate::monitor::governance::GovernanceDetector;
use crate::monitor::metrics::{MonitorMetrics, SecurityMetrics};
use crate::monitor::patterns::{PatternInput, PatternRegistry};
use crate::monitor::rate_limiter::SlidingWindowLimiter;
use crate::monitor::reporting::{AddressReport, Dashboard, ReportingFacade};
use crate::monitor::reputation::SuspiciousAddressSet;
use crate::monitor::rules::{ids as rule_ids, RuleAction, RuleRegistry};
use crate::monitor::scorer::RiskScorer;

/// Everything the engine mutates
pub struct MonitorState {
    pub limiter: SlidingWindowLimiter,
    pub reputation: SuspiciousAddressSet,
    pub store: Box<dyn EventStore>,
}

/// What one retention sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub events_removed: usize,
    pub windows_evicted: usize,
    pub flags_expired: usize,
}

/// Subject, counterparty and reference of an event being scored
struct EventDraft {
    event_type: EventType,
    address: String,
    counterparty: Option<String>,
    reference: EventReference,
}

pub struct SecurityEngineBuilder {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    collaborators: Option<Collaborators>,
    store: Option<Box<dyn EventStore>>,
}

impl SecurityEngineBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default collaborators. The configured blacklist seed is
    /// only used when no collaborators are supplied.
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn with_store(mut self, store: Box<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration and start the dispatch worker.
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<SecurityEngine> {
        let config = self.config;
        config.validate()?;

        let rules = RuleRegistry::from_config(&config.rules)?;
        let patterns = PatternRegistry::from_config(&config.patterns)?;
        let metrics = Arc::new(MonitorMetrics::new()?);

        let collaborators = match self.collaborators {
            Some(collaborators) => collaborators,
            None if !config.rules.blacklist_addresses.is_empty() => Collaborators::default()
                .with_blacklist(Arc::new(StaticBlacklist::new(&config.rules.blacklist_addresses))),
            None => Collaborators::default(),
        };

        let dispatcher = AlertDispatcher::spawn(
            collaborators.audit.clone(),
            collaborators.notifier.clone(),
            metrics.clone(),
            &config.dispatch,
        )?;

        let store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryEventStore::new(config.retention.max_events)));

        let state = MonitorState {
            limiter: SlidingWindowLimiter::from_config(&config.rate_limit),
            reputation: SuspiciousAddressSet::from_config(&config.reputation),
            store,
        };

        info!(
            rules = rules.len(),
            patterns = patterns.count(),
            notify_threshold = config.dispatch.notify_threshold,
            "Security engine initialised"
        );

        Ok(SecurityEngine {
            governance: GovernanceDetector::new(&rules),
            scorer: RiskScorer::new(config.scoring.clone()),
            rules,
            patterns,
            state: Mutex::new(state),
            metrics,
            dispatcher,
            blacklist: collaborators.blacklist,
            clock: self.clock,
            config,
        })
    }
}

pub struct SecurityEngine {
    config: MonitorConfig,
    rules: RuleRegistry,
    patterns: PatternRegistry,
    scorer: RiskScorer,
    governance: GovernanceDetector,
    state: Mutex<MonitorState>,
    metrics: Arc<MonitorMetrics>,
    dispatcher: AlertDispatcher,
    blacklist: Arc<dyn BlacklistLookup>,
    clock: Arc<dyn Clock>,
}

impl SecurityEngine {
    pub fn builder(config: MonitorConfig) -> SecurityEngineBuilder {
        SecurityEngineBuilder {
            config,
            clock: Arc::new(SystemClock),
            collaborators: None,
            store: None,
        }
    }

    /// Engine with default collaborators and the wall clock
    pub fn with_config(config: MonitorConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Score one transaction, append it and hand it to the dispatcher.
    ///
    /// Malformed input is rejected before any state is touched. Collaborator
    /// failures never fail the call.
    pub async fn monitor_transaction(&self, tx: TransactionEvent) -> Result<SecurityEvent> {
        let tx = tx.validate()?;
        let blacklisted = self.lookup_blacklist(&tx).await;
        let now = self.clock.now();

        let event = {
            let mut state = self.state.lock();
            let alerts = self.transaction_alerts(&mut state, &tx, &blacklisted, now);
            let draft = EventDraft {
                event_type: EventType::TransactionMonitor,
                address: tx.from.clone(),
                counterparty: Some(tx.to.clone()),
                reference: EventReference::Transaction { hash: tx.hash.clone() },
            };
            self.commit(&mut state, draft, alerts, now)?
        };

        self.dispatcher.enqueue(event.clone());
        Ok(event)
    }

    /// Score one governance action, append it and hand it to the dispatcher
    pub async fn monitor_governance(
        &self,
        proposal: Proposal,
        action: GovernanceAction,
    ) -> Result<SecurityEvent> {
        let (proposal_id, proposer) = proposal.validate()?;
        let now = self.clock.now();

        let event = {
            let mut state = self.state.lock();
            let alerts = self.governance.evaluate(
                state.store.as_ref(),
                &proposer,
                action,
                &proposal_id,
                now,
                &self.scorer,
            );
            let draft = EventDraft {
                event_type: EventType::GovernanceMonitor,
                address: proposer,
                counterparty: None,
                reference: EventReference::Proposal { proposal_id, action },
            };
            self.commit(&mut state, draft, alerts, now)?
        };

        self.dispatcher.enqueue(event.clone());
        Ok(event)
    }

    async fn lookup_blacklist(&self, tx: &ValidatedTransaction) -> Vec<String> {
        if !self.rules.is_enabled(rule_ids::BLACKLISTED_ADDRESS) {
            return Vec::new();
        }

        let addresses = [tx.from.clone(), tx.to.clone()];
        let call = self.blacklist.check_blacklist(&addresses);
        match guarded(self.blacklist.name(), self.config.dispatch.collaborator_timeout(), call)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(hash = %tx.hash, error = %e, "Blacklist lookup failed, scoring without it");
                self.metrics.record_collaborator_failure();
                Vec::new()
            }
        }
    }

    fn transaction_alerts(
        &self,
        state: &mut MonitorState,
        tx: &ValidatedTransaction,
        blacklisted: &[String],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if let Some(rule) = self.rules.get(rule_ids::RAPID_DONATIONS) {
            let window = rule.window();
            let count = state.limiter.record(&rule.id, &tx.from, window.as_ref(), now);
            if let Some(window) = window.filter(|w| w.is_exceeded(count)) {
                alerts.push(
                    Alert::new(
                        rule.id.clone(),
                        rule.severity,
                        rule.action,
                        format!(
                            "{} donations within {} seconds",
                            count,
                            window.time_window_ms / 1_000
                        ),
                    )
                    .with_score(self.scorer.increment(&rule.id))
                    .with_payload("count", count as u64)
                    .with_payload("max_count", window.max_count as u64)
                    .with_payload("time_window_ms", window.time_window_ms),
                );
            }
        }

        if tx.failed {
            if let Some(rule) = self.rules.get(rule_ids::FAILED_TRANSACTIONS) {
                let window = rule.window();
                let count = state.limiter.record(&rule.id, &tx.from, window.as_ref(), now);
                if let Some(window) = window.filter(|w| w.is_exceeded(count)) {
                    alerts.push(
                        Alert::new(
                            rule.id.clone(),
                            rule.severity,
                            rule.action,
                            format!("{} failed transactions within the window", count),
                        )
                        .with_score(self.scorer.increment(&rule.id))
                        .with_payload("count", count as u64)
                        .with_payload("max_count", window.max_count as u64)
                        .with_payload("time_window_ms", window.time_window_ms),
                    );
                }
            }
        }

        if let Some(rule) = self.rules.get(rule_ids::LARGE_DONATION) {
            if let Some(threshold) = rule.threshold().filter(|t| tx.value > *t) {
                alerts.push(
                    Alert::new(
                        rule.id.clone(),
                        rule.severity,
                        rule.action,
                        format!("Large donation: {}", tx.value),
                    )
                    .with_score(self.scorer.increment(&rule.id))
                    .with_payload("threshold", threshold.to_string())
                    .with_payload("value", tx.value.to_string()),
                );
            }
        }

        let input = PatternInput {
            gas_price: tx.gas_price,
            data: &tx.data,
            from: &tx.from,
            to: &tx.to,
        };
        for pattern in self.patterns.evaluate(&input) {
            debug!(hash = %tx.hash, pattern = %pattern.id, "Threat pattern matched");
            alerts.push(
                Alert::new(
                    pattern.id.clone(),
                    pattern.severity,
                    RuleAction::Alert,
                    format!("Threat pattern detected: {}", pattern.description),
                )
                .with_score(self.scorer.increment(&pattern.id))
                .with_payload("indicators", pattern.indicators.clone()),
            );
        }

        if let Some(rule) = self.rules.get(rule_ids::SUSPICIOUS_ADDRESS) {
            let flagged: Vec<&str> = [tx.from.as_str(), tx.to.as_str()]
                .into_iter()
                .filter(|addr| state.reputation.contains(addr, now))
                .collect();
            if !flagged.is_empty() {
                alerts.push(
                    Alert::new(
                        rule.id.clone(),
                        rule.severity,
                        rule.action,
                        "Transaction involves a suspicious address",
                    )
                    .with_score(self.scorer.increment(&rule.id))
                    .with_payload("addresses", flagged),
                );
            }
        }

        if let Some(rule) = self.rules.get(rule_ids::BLACKLISTED_ADDRESS) {
            if !blacklisted.is_empty() {
                alerts.push(
                    Alert::new(
                        rule.id.clone(),
                        rule.severity,
                        rule.action,
                        "Transaction involves a blacklisted address",
                    )
                    .with_score(self.scorer.increment(&rule.id))
                    .with_payload("addresses", blacklisted.to_vec()),
                );
            }
        }

        alerts
    }

    fn commit(
        &self,
        state: &mut MonitorState,
        draft: EventDraft,
        alerts: Vec<Alert>,
        now: DateTime<Utc>,
    ) -> Result<SecurityEvent> {
        let assessment = self.scorer.score(&alerts);
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: draft.event_type,
            timestamp: now,
            address: draft.address,
            counterparty: draft.counterparty,
            reference: draft.reference,
            alerts,
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level,
        };

        state.store.append(event.clone())?;
        self.metrics.record_event(&event);
        self.dispatcher.handle_critical(&event, &mut state.reputation, &self.metrics, now);

        if event.has_alerts() {
            info!(
                event_id = %event.id,
                address = %event.address,
                alerts = event.alerts.len(),
                risk_score = event.risk_score,
                "Security event recorded"
            );
        }
        Ok(event)
    }

    /// Retention and bounded-table maintenance
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let cutoff = window_start(now, self.config.retention.horizon());

        let mut state = self.state.lock();
        let report = SweepReport {
            events_removed: state.store.prune_older_than(cutoff),
            windows_evicted: state.limiter.prune_idle(now),
            flags_expired: state.reputation.expire(now),
        };
        drop(state);

        info!(
            events_removed = report.events_removed,
            windows_evicted = report.windows_evicted,
            flags_expired = report.flags_expired,
            "Retention sweep finished"
        );
        report
    }

    pub fn dashboard(&self) -> Dashboard {
        let now = self.clock.now();
        let state = self.state.lock();
        ReportingFacade::new(state.store.as_ref(), &state.reputation)
            .dashboard(self.metrics.snapshot(), now)
    }

    pub fn address_report(&self, address: &str) -> AddressReport {
        let now = self.clock.now();
        let state = self.state.lock();
        ReportingFacade::new(state.store.as_ref(), &state.reputation).address_report(address, now)
    }

    pub fn is_suspicious(&self, address: &str) -> bool {
        let now = self.clock.now();
        self.state.lock().reputation.contains(address, now)
    }

    pub fn suspicious_addresses(&self) -> Vec<String> {
        self.state.lock().reputation.addresses()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().store.len()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.state.lock().store.recent(limit)
    }

    pub fn metrics(&self) -> SecurityMetrics {
        self.metrics.snapshot()
    }

    /// Prometheus text exposition
    pub fn export_metrics(&self) -> Result<String> {
        self.metrics.export()
    }

    /// Audit/notify jobs still waiting for the dispatch worker
    pub fn dispatch_backlog(&self) -> usize {
        self.dispatcher.backlog()
    }

    /// Wait for queued audit entries and notifications
    pub async fn flush(&self) -> Result<()> {
        self.dispatcher.flush().await
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }
}
