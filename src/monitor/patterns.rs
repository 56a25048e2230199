//! Threat pattern registry
//!
//! Coarse heuristics over the raw transaction payload. Detectors compare a
//! gas-price ratio or the leading 4-byte selector of the call-data against
//! fixed constants; nothing here decodes arguments, and false positives are
//! expected. The output is advisory signal for the scorer, not ground truth.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::monitor::config::PatternConfig;
use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::rules::Severity;

/// Stable pattern identifiers
pub mod ids {
    pub const MEV_BOT: &str = "mev_bot";
    pub const FLASH_LOAN: &str = "flash_loan";
    pub const APPROVAL_FARMING: &str = "approval_farming";

    pub const ALL: [&str; 3] = [MEV_BOT, FLASH_LOAN, APPROVAL_FARMING];
}

/// Selectors of common flash-loan entry points
pub const FLASH_LOAN_SELECTORS: [[u8; 4]; 3] = [
    [0xab, 0x9c, 0x4b, 0x5d],
    [0x5c, 0xff, 0xe9, 0xde],
    [0x42, 0xb0, 0xb7, 0x7c],
];

/// ERC-20 `approve(address,uint256)`
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// Catalog entry describing a heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatPattern {
    pub id: String,
    pub indicators: Vec<String>,
    pub severity: Severity,
    pub description: String,
}

/// The slice of a transaction detectors look at
#[derive(Debug, Clone, Copy)]
pub struct PatternInput<'a> {
    pub gas_price: u64,
    pub data: &'a str,
    pub from: &'a str,
    pub to: &'a str,
}

/// Threat pattern detector
pub trait PatternDetector: Send + Sync {
    fn pattern(&self) -> &ThreatPattern;

    fn matches(&self, input: &PatternInput<'_>) -> bool;

    fn id(&self) -> &str {
        &self.pattern().id
    }
}

/// Leading 4-byte selector of hex call-data, if there is one
pub fn call_selector(data: &str) -> Option<[u8; 4]> {
    let body = data.strip_prefix("0x").or_else(|| data.strip_prefix("0X")).unwrap_or(data);
    let head = body.get(..8)?;
    let bytes = hex::decode(head).ok()?;
    bytes.try_into().ok()
}

/// MEV heuristic: gas price more than twice the baseline
pub struct MevGasDetector {
    pattern: ThreatPattern,
    baseline_gas_price: u64,
}

impl MevGasDetector {
    pub fn new(baseline_gas_price: u64) -> Self {
        Self {
            pattern: ThreatPattern {
                id: ids::MEV_BOT.to_string(),
                indicators: vec![format!("gas_price > 2 x {}", baseline_gas_price)],
                severity: Severity::High,
                description: "Gas price far above baseline, typical of front-running bots"
                    .to_string(),
            },
            baseline_gas_price,
        }
    }
}

impl PatternDetector for MevGasDetector {
    fn pattern(&self) -> &ThreatPattern {
        &self.pattern
    }

    fn matches(&self, input: &PatternInput<'_>) -> bool {
        u128::from(input.gas_price) > u128::from(self.baseline_gas_price) * 2
    }
}

/// Matches call-data starting with any of a fixed selector set
pub struct SelectorPrefixDetector {
    pattern: ThreatPattern,
    selectors: Vec<[u8; 4]>,
}

impl SelectorPrefixDetector {
    pub fn new(pattern: ThreatPattern, selectors: Vec<[u8; 4]>) -> Self {
        Self { pattern, selectors }
    }

    pub fn flash_loan() -> Self {
        Self::new(
            ThreatPattern {
                id: ids::FLASH_LOAN.to_string(),
                indicators: FLASH_LOAN_SELECTORS
                    .iter()
                    .map(|s| format!("0x{}", hex::encode(s)))
                    .collect(),
                severity: Severity::Critical,
                description: "Call-data opens with a known flash-loan selector".to_string(),
            },
            FLASH_LOAN_SELECTORS.to_vec(),
        )
    }

    pub fn approval_farming() -> Self {
        Self::new(
            ThreatPattern {
                id: ids::APPROVAL_FARMING.to_string(),
                indicators: vec![format!("0x{}", hex::encode(APPROVE_SELECTOR))],
                severity: Severity::Medium,
                description: "Call-data is a token approval".to_string(),
            },
            vec![APPROVE_SELECTOR],
        )
    }
}

impl PatternDetector for SelectorPrefixDetector {
    fn pattern(&self) -> &ThreatPattern {
        &self.pattern
    }

    fn matches(&self, input: &PatternInput<'_>) -> bool {
        call_selector(input.data).is_some_and(|selector| self.selectors.contains(&selector))
    }
}

/// Ordered set of detectors; evaluation order is registration order
#[derive(Default)]
pub struct PatternRegistry {
    detectors: Vec<Arc<dyn PatternDetector>>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self { detectors: Vec::new() }
    }

    /// Built-in detectors enabled by the configuration
    pub fn from_config(config: &PatternConfig) -> Result<Self> {
        for id in &config.enabled {
            if !ids::ALL.contains(&id.as_str()) {
                return Err(MonitorError::UnknownRule(id.clone()));
            }
        }

        let mut registry = Self::new();
        let enabled = |id: &str| config.enabled.iter().any(|e| e == id);

        if enabled(ids::MEV_BOT) {
            registry.register(Arc::new(MevGasDetector::new(config.mev_gas_baseline_wei)))?;
        }
        if enabled(ids::FLASH_LOAN) {
            registry.register(Arc::new(SelectorPrefixDetector::flash_loan()))?;
        }
        if enabled(ids::APPROVAL_FARMING) {
            registry.register(Arc::new(SelectorPrefixDetector::approval_farming()))?;
        }

        Ok(registry)
    }

    pub fn register(&mut self, detector: Arc<dyn PatternDetector>) -> Result<()> {
        if self.detectors.iter().any(|d| d.id() == detector.id()) {
            return Err(MonitorError::Configuration(format!(
                "pattern '{}' is already registered",
                detector.id()
            )));
        }
        self.detectors.push(detector);
        Ok(())
    }

    /// Patterns matched by the input
    pub fn evaluate(&self, input: &PatternInput<'_>) -> Vec<ThreatPattern> {
        self.detectors
            .iter()
            .filter(|detector| detector.matches(input))
            .map(|detector| detector.pattern().clone())
            .collect()
    }

    pub fn patterns(&self) -> Vec<&ThreatPattern> {
        self.detectors.iter().map(|d| d.pattern()).collect()
    }

    pub fn count(&self) -> usize {
        self.detectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(gas_price: u64, data: &str) -> PatternInput<'_> {
        PatternInput { gas_price, data, from: "0xa", to: "0xb" }
    }

    #[test]
    fn test_call_selector() {
        assert_eq!(call_selector("0x095ea7b3000000"), Some(APPROVE_SELECTOR));
        assert_eq!(call_selector("0X095EA7B3"), Some(APPROVE_SELECTOR));
        assert_eq!(call_selector("0x095e"), None);
        assert_eq!(call_selector(""), None);
    }

    #[test]
    fn test_mev_threshold_is_strict() {
        let detector = MevGasDetector::new(50);
        assert!(!detector.matches(&input(100, "0x")));
        assert!(detector.matches(&input(101, "0x")));
        assert!(!MevGasDetector::new(u64::MAX).matches(&input(u64::MAX, "0x")));
    }

    #[test]
    fn test_flash_loan_and_approval() {
        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        assert_eq!(registry.count(), 3);

        let matched = registry.evaluate(&input(1, "0xab9c4b5d0000"));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, ids::FLASH_LOAN);
        assert_eq!(matched[0].severity, Severity::Critical);

        let matched = registry.evaluate(&input(1, "0x095ea7b3ffff"));
        assert_eq!(matched[0].id, ids::APPROVAL_FARMING);

        assert!(registry.evaluate(&input(1, "0xa9059cbb")).is_empty());
    }

    #[test]
    fn test_unknown_pattern_rejected() {
        let config = PatternConfig { enabled: vec!["sandwich".into()], ..Default::default() };
        assert!(matches!(
            PatternRegistry::from_config(&config),
            Err(MonitorError::UnknownRule(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = PatternRegistry::new();
        registry.register(Arc::new(SelectorPrefixDetector::flash_loan())).unwrap();
        assert!(registry.register(Arc::new(SelectorPrefixDetector::flash_loan())).is_err());
    }
}
