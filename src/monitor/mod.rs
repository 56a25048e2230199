//! Donation-platform security monitor
//!
//! Scores blockchain transaction and governance events for risk with a small
//! rule and pattern engine, keeps per-address reputation state and exposes
//! read-only dashboards over the retained event log.
//!
//! `SecurityEngine` does the work; `MonitorService` runs it behind a request
//! channel with a periodic retention sweep.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod governance;
pub mod metrics;
pub mod patterns;
pub mod rate_limiter;
pub mod reporting;
pub mod reputation;
pub mod rules;
pub mod scorer;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    BlacklistLookup, Collaborators, LogNotifier, NoBlacklist, SecurityNotifier, StaticBlacklist,
};
pub use config::MonitorConfig;
pub use engine::{SecurityEngine, SecurityEngineBuilder, SweepReport};
pub use errors::{MonitorError, Result};
pub use event_store::{EventStore, MemoryEventStore};
pub use events::{
    Alert, EventReference, EventType, GovernanceAction, InboundMessage, Proposal, RiskLevel,
    SecurityEvent, TransactionEvent, TxStatus,
};
pub use metrics::SecurityMetrics;
pub use reporting::{AddressReport, Dashboard};
pub use rules::{RuleAction, Severity};
pub use service::{MonitorHandle, MonitorService};
