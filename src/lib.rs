#![allow(clippy::len_zero)]
#![allow(clippy::needless_return)]
// src/lib.rs

// Security monitoring pipeline
pub mod monitor;

// Audit trail sinks
pub mod audit;
