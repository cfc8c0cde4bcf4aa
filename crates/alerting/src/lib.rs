//! Alerting System
//!
//! Maps decision-trace confidence to severity levels and deduplicates or
//! throttles repeated alerts for the same component.

mod manager;
mod severity;

pub use manager::{AlertConfig, AlertManager, AlertState, Suppression};
pub use severity::Severity;
