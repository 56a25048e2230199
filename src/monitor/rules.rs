//! Alert rule registry
//!
//! Static catalog of threshold, frequency, behavioral, failure-rate and
//! governance rules. The catalog is built once at startup; configuration may
//! disable rules or override their parameters, and any reference to an
//! unknown rule id fails there rather than at scoring time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::monitor::clock::millis_span;
use crate::monitor::config::{RuleOverride, RulesConfig, MAX_SPAN_SECS};
use crate::monitor::errors::{MonitorError, Result};

/// Stable rule identifiers
pub mod ids {
    pub const LARGE_DONATION: &str = "large_donation";
    pub const RAPID_DONATIONS: &str = "rapid_donations";
    pub const FAILED_TRANSACTIONS: &str = "failed_transactions";
    pub const SUSPICIOUS_ADDRESS: &str = "suspicious_address";
    pub const BLACKLISTED_ADDRESS: &str = "blacklisted_address";
    pub const GOVERNANCE_MANIPULATION: &str = "governance_manipulation";

    pub const ALL: [&str; 6] = [
        LARGE_DONATION,
        RAPID_DONATIONS,
        FAILED_TRANSACTIONS,
        SUSPICIOUS_ADDRESS,
        BLACKLISTED_ADDRESS,
        GOVERNANCE_MANIPULATION,
    ];
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    /// Runs critical handling: the subject address is flagged
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Threshold,
    Frequency,
    Behavioral,
    FailureRate,
    Governance,
}

/// Escalation attached to a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Record the alert only
    Alert,
    /// Add the subject address to the suspicious set
    FlagAddress,
    /// Count the transaction as blocked (advisory, enforcement is external)
    Block,
}

/// Trailing window parameters for frequency-style rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    pub time_window_ms: u64,
    pub max_count: usize,
}

impl WindowParams {
    /// Used when a frequency check has no rule to read parameters from
    pub const CONSERVATIVE: Self = Self { time_window_ms: 60_000, max_count: 10 };

    pub fn time_window(&self) -> chrono::Duration {
        millis_span(self.time_window_ms)
    }

    /// Strictly more than `max_count` events breach the window
    pub fn is_exceeded(&self, count: usize) -> bool {
        count > self.max_count
    }
}

/// Rule parameters; which fields matter depends on the rule kind
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub kind: RuleKind,
    pub parameters: RuleParameters,
    pub severity: Severity,
    pub action: RuleAction,
    pub description: String,
}

impl AlertRule {
    fn new(
        id: &str,
        kind: RuleKind,
        parameters: RuleParameters,
        severity: Severity,
        action: RuleAction,
        description: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            parameters,
            severity,
            action,
            description: description.to_string(),
        }
    }

    /// Window parameters, if the rule defines both a window and a count
    pub fn window(&self) -> Option<WindowParams> {
        match (self.parameters.time_window_ms, self.parameters.max_count) {
            (Some(time_window_ms), Some(max_count)) => {
                Some(WindowParams { time_window_ms, max_count })
            }
            _ => None,
        }
    }

    pub fn threshold(&self) -> Option<Decimal> {
        self.parameters.threshold
    }

    fn apply(&mut self, over: &RuleOverride) {
        if let Some(threshold) = over.threshold {
            self.parameters.threshold = Some(threshold);
        }
        if let Some(window) = over.time_window_ms {
            self.parameters.time_window_ms = Some(window);
        }
        if let Some(max_count) = over.max_count {
            self.parameters.max_count = Some(max_count);
        }
        if let Some(severity) = over.severity {
            self.severity = severity;
        }
        if let Some(action) = over.action {
            self.action = action;
        }
    }
}

/// Catalog of enabled rules keyed by id
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: HashMap<String, AlertRule>,
}

impl RuleRegistry {
    /// The built-in catalog with every rule enabled
    pub fn defaults() -> Self {
        let catalog = vec![
            AlertRule::new(
                ids::LARGE_DONATION,
                RuleKind::Threshold,
                RuleParameters { threshold: Some(Decimal::from(10)), ..Default::default() },
                Severity::Medium,
                RuleAction::Alert,
                "Donation value above the large-donation threshold",
            ),
            AlertRule::new(
                ids::RAPID_DONATIONS,
                RuleKind::Frequency,
                RuleParameters {
                    time_window_ms: Some(5 * 60 * 1000),
                    max_count: Some(5),
                    ..Default::default()
                },
                Severity::High,
                RuleAction::FlagAddress,
                "Too many donations from one sender inside the window",
            ),
            AlertRule::new(
                ids::FAILED_TRANSACTIONS,
                RuleKind::FailureRate,
                RuleParameters {
                    time_window_ms: Some(60 * 60 * 1000),
                    max_count: Some(3),
                    ..Default::default()
                },
                Severity::Medium,
                RuleAction::Alert,
                "Repeated failed transactions from one sender",
            ),
            AlertRule::new(
                ids::SUSPICIOUS_ADDRESS,
                RuleKind::Behavioral,
                RuleParameters::default(),
                Severity::High,
                RuleAction::Alert,
                "Sender or recipient already flagged as suspicious",
            ),
            AlertRule::new(
                ids::BLACKLISTED_ADDRESS,
                RuleKind::Behavioral,
                RuleParameters::default(),
                Severity::Critical,
                RuleAction::Block,
                "Sender or recipient reported by the blacklist lookup",
            ),
            AlertRule::new(
                ids::GOVERNANCE_MANIPULATION,
                RuleKind::Governance,
                RuleParameters {
                    time_window_ms: Some(60 * 60 * 1000),
                    max_count: Some(3),
                    ..Default::default()
                },
                Severity::Critical,
                RuleAction::FlagAddress,
                "Proposer created too many proposals inside the window",
            ),
        ];

        Self { rules: catalog.into_iter().map(|rule| (rule.id.clone(), rule)).collect() }
    }

    /// Build the registry from configuration, failing on any unknown id
    pub fn from_config(config: &RulesConfig) -> Result<Self> {
        let mut registry = Self::defaults();

        for id in config.enabled.iter().chain(config.overrides.keys()) {
            if !registry.rules.contains_key(id) {
                return Err(MonitorError::UnknownRule(id.clone()));
            }
        }

        registry.apply_overrides(&config.overrides);
        registry.retain_enabled(&config.enabled);

        for rule in registry.rules.values() {
            registry.check_parameters(rule)?;
        }

        Ok(registry)
    }

    /// Overlay configured parameters; ids not in the catalog are ignored
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, RuleOverride>) {
        for (id, over) in overrides {
            if let Some(rule) = self.rules.get_mut(id) {
                rule.apply(over);
            }
        }
    }

    pub fn retain_enabled(&mut self, enabled: &[String]) {
        self.rules.retain(|id, _| enabled.iter().any(|e| e == id));
    }

    fn check_parameters(&self, rule: &AlertRule) -> Result<()> {
        let needs_window = matches!(
            rule.kind,
            RuleKind::Frequency | RuleKind::FailureRate | RuleKind::Governance
        );
        if needs_window {
            match rule.window() {
                Some(window)
                    if window.time_window_ms > 0
                        && window.time_window_ms <= MAX_SPAN_SECS * 1_000
                        && window.max_count > 0 => {}
                _ => {
                    return Err(MonitorError::Configuration(format!(
                        "rule '{}' needs a time_window_ms between 1 and {} and a positive max_count",
                        rule.id,
                        MAX_SPAN_SECS * 1_000
                    )))
                }
            }
        }
        if rule.kind == RuleKind::Threshold && rule.threshold().is_none() {
            return Err(MonitorError::Configuration(format!(
                "rule '{}' needs a threshold",
                rule.id
            )));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&AlertRule> {
        self.rules.get(id)
    }

    /// Lookup that treats a missing rule as a configuration error
    pub fn require(&self, id: &str) -> Result<&AlertRule> {
        self.rules.get(id).ok_or_else(|| MonitorError::UnknownRule(id.to_string()))
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertRule> {
        self.rules.values()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}
