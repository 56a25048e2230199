//! Monitor configuration
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! Files are read as TOML when the extension is `.toml`, JSON otherwise.
//! `SENTINEL_*` environment variables override individual fields.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::monitor::clock::secs_span;
use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::patterns::{ids as pattern_ids, PatternRegistry};
use crate::monitor::reputation::FlagExpiry;
use crate::monitor::rules::{ids as rule_ids, RuleAction, RuleRegistry, Severity};
use crate::monitor::scorer::{ScoringPolicy, MAX_RISK_SCORE};

/// Longest time span any setting may configure: ten years
pub const MAX_SPAN_SECS: u64 = 10 * 365 * 86_400;

/// Monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub rules: RulesConfig,
    pub scoring: ScoringPolicy,
    pub patterns: PatternConfig,
    pub rate_limit: RateLimitConfig,
    pub reputation: ReputationConfig,
    pub retention: RetentionConfig,
    pub dispatch: DispatchConfig,
    pub service: ServiceConfig,
}

/// Rule catalog selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Enabled rule ids
    pub enabled: Vec<String>,
    /// Per-rule parameter overrides
    pub overrides: HashMap<String, RuleOverride>,
    /// Seed entries for the built-in static blacklist lookup
    pub blacklist_addresses: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            enabled: rule_ids::ALL.iter().map(|id| id.to_string()).collect(),
            overrides: HashMap::new(),
            blacklist_addresses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOverride {
    pub threshold: Option<Decimal>,
    pub time_window_ms: Option<u64>,
    pub max_count: Option<usize>,
    pub severity: Option<Severity>,
    pub action: Option<RuleAction>,
}

/// Threat pattern detectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub enabled: Vec<String>,
    /// Baseline gas price in wei; the MEV heuristic fires above twice this
    pub mev_gas_baseline_wei: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            enabled: pattern_ids::ALL.iter().map(|id| id.to_string()).collect(),
            mev_gas_baseline_wei: 50_000_000_000, // 50 gwei
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_tracked_addresses: usize,
    pub idle_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_tracked_addresses: 50_000, idle_ttl_secs: 86_400 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Upper bound on flagged addresses. Once full, flagging a new address
    /// drops the oldest flag (logged at error level), so under
    /// `FlagExpiry::Permanent` a flag holds until restart only while the set
    /// stays below this bound. Size it above the expected flag volume.
    pub max_suspicious: usize,
    pub expiry: FlagExpiry,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self { max_suspicious: 100_000, expiry: FlagExpiry::Permanent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub horizon_days: u32,
    pub sweep_interval_secs: u64,
    pub max_events: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { horizon_days: 30, sweep_interval_secs: 3_600, max_events: 100_000 }
    }
}

impl RetentionConfig {
    pub fn horizon(&self) -> chrono::Duration {
        secs_span(u64::from(self.horizon_days) * 86_400)
    }
}

/// Alert dispatch and collaborator policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Events scoring at or above this notify the security team
    pub notify_threshold: u8,
    /// Count flash-loan and block-action alerts as blocked transactions
    pub auto_block: bool,
    pub collaborator_timeout_ms: u64,
    /// Audit/notify jobs waiting for the worker; further jobs are dropped
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            notify_threshold: 60,
            auto_block: true,
            collaborator_timeout_ms: 2_000,
            queue_capacity: 4_096,
        }
    }
}

impl DispatchConfig {
    pub fn collaborator_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.collaborator_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { channel_capacity: 1_024 }
    }
}

impl MonitorConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults, or `SENTINEL_CONFIG` if set, with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("SENTINEL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SENTINEL_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SENTINEL_NOTIFY_THRESHOLD") {
            self.dispatch.notify_threshold = parse_var("SENTINEL_NOTIFY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_AUTO_BLOCK") {
            self.dispatch.auto_block = parse_var("SENTINEL_AUTO_BLOCK", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_COLLABORATOR_TIMEOUT_MS") {
            self.dispatch.collaborator_timeout_ms =
                parse_var("SENTINEL_COLLABORATOR_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_RETENTION_DAYS") {
            self.retention.horizon_days = parse_var("SENTINEL_RETENTION_DAYS", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_SWEEP_INTERVAL_SECS") {
            self.retention.sweep_interval_secs = parse_var("SENTINEL_SWEEP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_MEV_GAS_BASELINE_WEI") {
            self.patterns.mev_gas_baseline_wei = parse_var("SENTINEL_MEV_GAS_BASELINE_WEI", &v)?;
        }
        if let Some(v) = lookup("SENTINEL_BLACKLIST") {
            self.rules.blacklist_addresses = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        RuleRegistry::from_config(&self.rules)?;
        PatternRegistry::from_config(&self.patterns)?;

        if self.dispatch.notify_threshold > MAX_RISK_SCORE {
            return Err(MonitorError::Configuration(format!(
                "notify_threshold must be at most {}",
                MAX_RISK_SCORE
            )));
        }
        check_span("collaborator_timeout_ms", self.dispatch.collaborator_timeout_ms / 1_000)?;
        if self.dispatch.collaborator_timeout_ms == 0 {
            return Err(MonitorError::Configuration(
                "collaborator_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(MonitorError::Configuration(
                "dispatch queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.retention.horizon_days == 0 {
            return Err(MonitorError::Configuration(
                "retention horizon_days must be greater than 0".to_string(),
            ));
        }
        check_span("retention horizon_days", u64::from(self.retention.horizon_days) * 86_400)?;
        if self.retention.sweep_interval_secs == 0 {
            return Err(MonitorError::Configuration(
                "sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        check_span("sweep_interval_secs", self.retention.sweep_interval_secs)?;
        check_span("rate_limit idle_ttl_secs", self.rate_limit.idle_ttl_secs)?;
        if let FlagExpiry::AfterSecs { secs } = self.reputation.expiry {
            check_span("reputation expiry secs", secs)?;
        }
        if self.retention.max_events == 0 {
            return Err(MonitorError::Configuration(
                "max_events must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.max_tracked_addresses == 0 || self.reputation.max_suspicious == 0 {
            return Err(MonitorError::Configuration(
                "address table bounds must be greater than 0".to_string(),
            ));
        }
        if self.service.channel_capacity == 0 {
            return Err(MonitorError::Configuration(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_span(name: &str, secs: u64) -> Result<()> {
    if secs > MAX_SPAN_SECS {
        return Err(MonitorError::Configuration(format!(
            "{} exceeds the {}s limit",
            name, MAX_SPAN_SECS
        )));
    }
    Ok(())
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("toml")
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MonitorError::Configuration(format!("{}='{}': {}", key, value, e)))
}
