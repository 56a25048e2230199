//! Inbound events and the security events produced from them

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::rules::{RuleAction, Severity};

/// Addresses are compared case-insensitively
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Outcome reported for an on-chain transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Success,
    Failed,
}

/// Raw transaction as delivered by the chain watcher
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionEvent {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Decimal string in native token units
    #[serde(default)]
    pub value: String,
    /// Wei
    #[serde(default)]
    pub gas_price: u64,
    /// Hex call-data, with or without `0x`
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub status: TxStatus,
}

/// A transaction whose fields have been checked and normalized
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTransaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: Decimal,
    pub gas_price: u64,
    pub data: String,
    pub failed: bool,
}

impl TransactionEvent {
    pub fn validate(&self) -> Result<ValidatedTransaction> {
        let hash = required("hash", &self.hash)?;
        let from = required("from", &self.from)?;
        let to = required("to", &self.to)?;
        let value_str = required("value", &self.value)?;

        let value = Decimal::from_str(value_str)
            .map_err(|e| MonitorError::InvalidInput(format!("value '{}': {}", value_str, e)))?;
        if value.is_sign_negative() {
            return Err(MonitorError::InvalidInput(format!("value '{}' is negative", value_str)));
        }

        let data = self.data.trim();
        let body = data.strip_prefix("0x").or_else(|| data.strip_prefix("0X")).unwrap_or(data);
        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MonitorError::InvalidInput("data is not a hex string".to_string()));
        }

        Ok(ValidatedTransaction {
            hash: hash.to_string(),
            from: normalize_address(from),
            to: normalize_address(to),
            value,
            gas_price: self.gas_price,
            data: data.to_ascii_lowercase(),
            failed: self.status == TxStatus::Failed,
        })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(MonitorError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

/// Governance action on a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernanceAction {
    Create,
    Vote,
}

/// Governance proposal as seen by the monitor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Proposal {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub proposer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Proposal {
    /// Returns the normalized proposer
    pub fn validate(&self) -> Result<(String, String)> {
        let id = required("proposal.id", &self.id)?;
        let proposer = required("proposal.proposer", &self.proposer)?;
        Ok((id.to_string(), normalize_address(proposer)))
    }
}

/// One line of a replay feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundMessage {
    Transaction(TransactionEvent),
    Governance { proposal: Proposal, action: GovernanceAction },
}

/// Which monitor produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TransactionMonitor,
    GovernanceMonitor,
}

/// What the event correlates to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventReference {
    Transaction { hash: String },
    Proposal { proposal_id: String, action: GovernanceAction },
}

impl EventReference {
    pub fn is_proposal_creation(&self) -> bool {
        matches!(self, Self::Proposal { action: GovernanceAction::Create, .. })
    }
}

/// Discrete risk label derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::Critical,
            60..=79 => Self::High,
            40..=59 => Self::Medium,
            20..=39 => Self::Low,
            _ => Self::Minimal,
        }
    }
}

/// A single rule or pattern match attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Rule or pattern id
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub action: RuleAction,
    /// Points this alert contributed to the risk score
    pub score: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, Value>,
}

impl Alert {
    pub fn new(
        alert_type: impl Into<String>,
        severity: Severity,
        action: RuleAction,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type: alert_type.into(),
            severity,
            message: message.into(),
            action,
            score: 0,
            payload: BTreeMap::new(),
        }
    }

    pub fn with_score(mut self, score: u8) -> Self {
        self.score = score;
        self
    }

    pub fn with_payload(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Scored, immutable record of one inbound event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Sender or proposer
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub reference: EventReference,
    pub alerts: Vec<Alert>,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

impl SecurityEvent {
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }

    /// Subject or counterparty matches
    pub fn involves(&self, address: &str) -> bool {
        let address = normalize_address(address);
        self.address == address || self.counterparty.as_deref() == Some(address.as_str())
    }

    pub fn has_alert(&self, alert_type: &str) -> bool {
        self.alerts.iter().any(|alert| alert.alert_type == alert_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> TransactionEvent {
        TransactionEvent {
            hash: "0xabc".into(),
            from: " 0xAAAA ".into(),
            to: "0xBBBB".into(),
            value: "1.5".into(),
            gas_price: 20_000_000_000,
            data: "0x".into(),
            status: TxStatus::Success,
        }
    }

    #[test]
    fn test_validate_normalizes_addresses() {
        let validated = tx().validate().unwrap();
        assert_eq!(validated.from, "0xaaaa");
        assert_eq!(validated.to, "0xbbbb");
        assert_eq!(validated.value, Decimal::new(15, 1));
        assert!(!validated.failed);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut event = tx();
        event.hash = "  ".into();
        assert!(matches!(event.validate(), Err(MonitorError::MissingField("hash"))));

        let mut event = tx();
        event.value = "".into();
        assert!(matches!(event.validate(), Err(MonitorError::MissingField("value"))));
    }

    #[test]
    fn test_validate_rejects_bad_value_and_data() {
        let mut event = tx();
        event.value = "ten".into();
        assert!(matches!(event.validate(), Err(MonitorError::InvalidInput(_))));

        let mut event = tx();
        event.value = "-1".into();
        assert!(matches!(event.validate(), Err(MonitorError::InvalidInput(_))));

        let mut event = tx();
        event.data = "0xzz".into();
        assert!(matches!(event.validate(), Err(MonitorError::InvalidInput(_))));
    }

    #[test]
    fn test_risk_level_breakpoints() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(19), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(20), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn test_inbound_message_parsing() {
        let line = r#"{"kind":"transaction","hash":"0x1","from":"0xA","to":"0xB","value":"2","gas_price":1,"data":"0x"}"#;
        let msg: InboundMessage = serde_json::from_str(line).unwrap();
        assert!(matches!(msg, InboundMessage::Transaction(ref tx) if tx.hash == "0x1"));

        let line = r#"{"kind":"governance","proposal":{"id":"p1","proposer":"0xC"},"action":"create"}"#;
        let msg: InboundMessage = serde_json::from_str(line).unwrap();
        assert!(matches!(
            msg,
            InboundMessage::Governance { action: GovernanceAction::Create, .. }
        ));
    }

    #[test]
    fn test_proposal_creation_reference() {
        let create = EventReference::Proposal { proposal_id: "p".into(), action: GovernanceAction::Create };
        let vote = EventReference::Proposal { proposal_id: "p".into(), action: GovernanceAction::Vote };
        assert!(create.is_proposal_creation());
        assert!(!vote.is_proposal_creation());
    }
}
