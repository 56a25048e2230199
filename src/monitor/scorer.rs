//! Risk scorer
//!
//! Pure reducer: each alert contributes the policy increment for its type and
//! the sum is clamped to `[0, 100]`. The scorer keeps no state between events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::monitor::events::{Alert, RiskLevel};
use crate::monitor::patterns::ids as pattern_ids;
use crate::monitor::rules::ids as rule_ids;

pub const MAX_RISK_SCORE: u8 = 100;

/// Points added per alert type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub large_donation: u8,
    pub rapid_donations: u8,
    pub failed_transactions: u8,
    pub suspicious_address: u8,
    pub blacklisted_address: u8,
    pub governance_manipulation: u8,
    pub mev_bot: u8,
    pub flash_loan: u8,
    pub approval_farming: u8,
    /// Increments for alert types registered outside the built-in catalog
    pub custom: HashMap<String, u8>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            large_donation: 30,
            rapid_donations: 50,
            failed_transactions: 25,
            suspicious_address: 40,
            blacklisted_address: 90,
            governance_manipulation: 80,
            mev_bot: 60,
            flash_loan: 80,
            approval_farming: 40,
            custom: HashMap::new(),
        }
    }
}

impl ScoringPolicy {
    /// Increment for an alert type; unknown types score nothing
    pub fn increment_for(&self, alert_type: &str) -> u8 {
        match alert_type {
            rule_ids::LARGE_DONATION => self.large_donation,
            rule_ids::RAPID_DONATIONS => self.rapid_donations,
            rule_ids::FAILED_TRANSACTIONS => self.failed_transactions,
            rule_ids::SUSPICIOUS_ADDRESS => self.suspicious_address,
            rule_ids::BLACKLISTED_ADDRESS => self.blacklisted_address,
            rule_ids::GOVERNANCE_MANIPULATION => self.governance_manipulation,
            pattern_ids::MEV_BOT => self.mev_bot,
            pattern_ids::FLASH_LOAN => self.flash_loan,
            pattern_ids::APPROVAL_FARMING => self.approval_farming,
            other => self.custom.get(other).copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

impl RiskAssessment {
    pub fn from_total(total: u32) -> Self {
        let risk_score = total.min(u32::from(MAX_RISK_SCORE)) as u8;
        Self { risk_score, risk_level: RiskLevel::from_score(risk_score) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    policy: ScoringPolicy,
}

impl RiskScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn increment(&self, alert_type: &str) -> u8 {
        self.policy.increment_for(alert_type)
    }

    pub fn score(&self, alerts: &[Alert]) -> RiskAssessment {
        let total: u32 = alerts.iter().map(|a| u32::from(self.increment(&a.alert_type))).sum();
        RiskAssessment::from_total(total)
    }
}
