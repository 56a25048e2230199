//! Governance anomaly detection
//!
//! Proposal creation is checked against the stored history of the same
//! proposer. Votes are accepted and logged but never raise alerts.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::monitor::clock::window_start;
use crate::monitor::event_store::EventStore;
use crate::monitor::events::{Alert, EventType, GovernanceAction};
use crate::monitor::rules::{ids as rule_ids, AlertRule, RuleRegistry};
use crate::monitor::scorer::RiskScorer;

#[derive(Debug, Clone, Default)]
pub struct GovernanceDetector {
    rule: Option<AlertRule>,
}

impl GovernanceDetector {
    pub fn new(rules: &RuleRegistry) -> Self {
        Self { rule: rules.get(rule_ids::GOVERNANCE_MANIPULATION).cloned() }
    }

    pub fn is_enabled(&self) -> bool {
        self.rule.is_some()
    }

    /// Alerts for one governance action. `proposer` must already be normalized.
    pub fn evaluate(
        &self,
        store: &dyn EventStore,
        proposer: &str,
        action: GovernanceAction,
        proposal_id: &str,
        now: DateTime<Utc>,
        scorer: &RiskScorer,
    ) -> Vec<Alert> {
        match action {
            GovernanceAction::Vote => {
                debug!(proposer = %proposer, proposal_id = %proposal_id, "Governance vote observed");
                Vec::new()
            }
            GovernanceAction::Create => self.check_rapid_proposals(store, proposer, now, scorer),
        }
    }

    fn check_rapid_proposals(
        &self,
        store: &dyn EventStore,
        proposer: &str,
        now: DateTime<Utc>,
        scorer: &RiskScorer,
    ) -> Vec<Alert> {
        let Some(rule) = &self.rule else {
            return Vec::new();
        };
        let Some(window) = rule.window() else {
            return Vec::new();
        };

        let cutoff = window_start(now, window.time_window());
        let prior = store
            .iter()
            .filter(|event| {
                event.timestamp > cutoff
                    && event.event_type == EventType::GovernanceMonitor
                    && event.address == proposer
                    && event.reference.is_proposal_creation()
            })
            .count();
        let total = prior + 1;

        if total < window.max_count {
            return Vec::new();
        }

        warn!(
            proposer = %proposer,
            proposals = total,
            window_ms = window.time_window_ms,
            "Rapid proposal creation detected"
        );
        vec![Alert::new(
            rule.id.clone(),
            rule.severity,
            rule.action,
            format!(
                "{} proposals created within {} minutes",
                total,
                window.time_window_ms / 60_000
            ),
        )
        .with_score(scorer.increment(&rule.id))
        .with_payload("count", total as u64)
        .with_payload("max_count", window.max_count as u64)
        .with_payload("time_window_ms", window.time_window_ms)]
    }
}
