//! Decision Trace Engine
//!
//! Deterministic rule evaluation for component alerts:
//! - Feature records in, auditable decision traces out
//! - Ordered, hand-authored rule tables with conditional rules
//! - Confidence accumulated as an explicit fold, clamped to [0, 1]
//! - Offline threshold adjustment from operator feedback

mod adjuster;
mod config;
mod engine;
mod error;
mod record;
mod rules;
mod trace;

pub use adjuster::{
    latest_rejection, AdjusterConfig, Feedback, InteractionLogEntry, ThresholdAdjuster,
    ThresholdAdjustment, REJECTION_REASON,
};
pub use config::{DecisionThresholds, EngineConfig};
pub use engine::RuleEngine;
pub use error::{EngineError, RuleConfigError};
pub use record::{Component, FeatureRecord};
pub use rules::{Comparison, ComponentRules, Rule, RuleSet, RuleTier};
pub use trace::{Behavior, Decision, DecisionTrace, ReasoningStep, RuleResult};
