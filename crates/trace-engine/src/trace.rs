//! Decision traces
//!
//! A trace is the only externally visible output of the engine. It is built
//! once by the evaluator and exposes read-only accessors; the JSON field names
//! are part of the contract with downstream consumers.

use crate::error::EngineError;
use crate::record::parse_instant;
use crate::rules::Comparison;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final classification of an evaluated record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Normal,
    Borderline,
    Danger,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Normal => "NORMAL",
            Decision::Borderline => "BORDERLINE",
            Decision::Danger => "DANGER",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic component behavior, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Behavior {
    /// Operating within all thresholds
    #[default]
    Stable,
    /// Only watch-tier rules fired
    Drifting,
    /// At least one danger-tier rule fired
    Degrading,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Stable => "STABLE",
            Behavior::Drifting => "DRIFTING",
            Behavior::Degrading => "DEGRADING",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded for a step; only fired rules are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleResult {
    Fired,
}

/// One fired rule within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    step: usize,
    rule: String,
    feature: String,
    feature_value: f64,
    comparison: Comparison,
    threshold: f64,
    confidence_delta: f64,
    rule_result: RuleResult,
    confidence_after_step: f64,
}

impl ReasoningStep {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn fired(
        step: usize,
        rule: &str,
        feature: &str,
        feature_value: f64,
        comparison: Comparison,
        threshold: f64,
        confidence_delta: f64,
        confidence_after_step: f64,
    ) -> Self {
        Self {
            step,
            rule: rule.to_string(),
            feature: feature.to_string(),
            feature_value,
            comparison,
            threshold,
            confidence_delta,
            rule_result: RuleResult::Fired,
            confidence_after_step,
        }
    }

    /// 1-based position in evaluation order
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Observed feature value
    pub fn feature_value(&self) -> f64 {
        self.feature_value
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn confidence_delta(&self) -> f64 {
        self.confidence_delta
    }

    pub fn rule_result(&self) -> RuleResult {
        self.rule_result
    }

    /// Running confidence immediately after this step
    pub fn confidence_after_step(&self) -> f64 {
        self.confidence_after_step
    }
}

/// Auditable result of evaluating one feature record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    alert_id: String,
    component_id: String,
    timestamp: String,
    decision: Decision,
    final_confidence: f64,
    rules_triggered: Vec<String>,
    reasoning_trace: Vec<ReasoningStep>,
    expected_behavior: Behavior,
    observed_behavior: Behavior,
    expectation_mismatch: bool,
}

impl DecisionTrace {
    /// Assemble a trace from its evaluated steps
    ///
    /// `rules_triggered`, `final_confidence` and the mismatch flag are derived
    /// from the steps so they cannot disagree with them.
    pub(crate) fn assemble(
        alert_id: String,
        component_id: String,
        timestamp: String,
        decision: Decision,
        reasoning_trace: Vec<ReasoningStep>,
        expected_behavior: Behavior,
        observed_behavior: Behavior,
    ) -> Self {
        let final_confidence = reasoning_trace
            .last()
            .map_or(0.0, |s| s.confidence_after_step);
        let rules_triggered = reasoning_trace.iter().map(|s| s.rule.clone()).collect();

        Self {
            alert_id,
            component_id,
            timestamp,
            decision,
            final_confidence,
            rules_triggered,
            reasoning_trace,
            expected_behavior,
            observed_behavior,
            expectation_mismatch: expected_behavior != observed_behavior,
        }
    }

    pub fn alert_id(&self) -> &str {
        &self.alert_id
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    /// Timestamp echoed from the input record
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Timestamp as a UTC instant
    pub fn instant(&self) -> Result<DateTime<Utc>, EngineError> {
        parse_instant(&self.timestamp)
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn final_confidence(&self) -> f64 {
        self.final_confidence
    }

    pub fn rules_triggered(&self) -> &[String] {
        &self.rules_triggered
    }

    pub fn reasoning_trace(&self) -> &[ReasoningStep] {
        &self.reasoning_trace
    }

    pub fn expected_behavior(&self) -> Behavior {
        self.expected_behavior
    }

    pub fn observed_behavior(&self) -> Behavior {
        self.observed_behavior
    }

    pub fn expectation_mismatch(&self) -> bool {
        self.expectation_mismatch
    }

    /// Whether no rule fired
    pub fn is_quiet(&self) -> bool {
        self.reasoning_trace.is_empty()
    }

    /// Compact JSON document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Pretty-printed JSON document
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
