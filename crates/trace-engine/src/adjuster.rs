//! Threshold Adjustment from Operator Feedback
//!
//! When an operator rejects an alert, the readings that triggered it are
//! treated as normal for that component. The adjuster moves each triggered
//! rule's threshold just past the rejected reading and returns a new rule
//! table with an audit trail. It never touches a table an engine already
//! holds; a fresh engine has to be built from the result.

use crate::error::EngineError;
use crate::record::Component;
use crate::rules::RuleSet;
use crate::trace::DecisionTrace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Reason recorded for feedback-driven adjustments
pub const REJECTION_REASON: &str = "User rejected alert - value now considered normal";

/// Adjuster configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjusterConfig {
    /// Margin placed beyond the rejected value (default: 0.05)
    pub safety_margin: f64,
    /// Largest relative change allowed per adjustment (default: 0.50)
    pub max_change_ratio: f64,
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            safety_margin: 0.05,
            max_change_ratio: 0.50,
        }
    }
}

/// Operator verdict on a generated explanation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feedback {
    Accepted,
    Rejected,
}

/// One logged interaction between an operator and an explained alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLogEntry {
    pub timestamp: String,
    pub input_trace: DecisionTrace,
    #[serde(default)]
    pub output_explanation: String,
    #[serde(default)]
    pub user_feedback: Option<Feedback>,
}

impl InteractionLogEntry {
    /// Entry for an explanation that has not been reviewed yet
    pub fn unreviewed(
        timestamp: impl Into<String>,
        input_trace: DecisionTrace,
        output_explanation: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            input_trace,
            output_explanation: output_explanation.into(),
            user_feedback: None,
        }
    }
}

/// Most recent rejected interaction, scanning from the end of the log
pub fn latest_rejection(log: &[InteractionLogEntry]) -> Option<&InteractionLogEntry> {
    log.iter()
        .rev()
        .find(|entry| entry.user_feedback == Some(Feedback::Rejected))
}

/// Audit record for a single threshold change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAdjustment {
    pub rule: String,
    pub component: Component,
    pub feature: String,
    pub old_threshold: f64,
    pub new_threshold: f64,
    pub rejected_value: f64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Computes relaxed thresholds for rejected alerts
#[derive(Debug, Clone, Default)]
pub struct ThresholdAdjuster {
    config: AdjusterConfig,
}

impl ThresholdAdjuster {
    pub fn new(config: AdjusterConfig) -> Self {
        Self { config }
    }

    /// New threshold for an upper-bound rule (`>` / `>=`)
    ///
    /// Moves past the rejected value by the safety margin, capped at the
    /// maximum relative increase, rounded to two decimals. Margin and cap
    /// scale with magnitude, so negative thresholds move up as well. The
    /// result is never below `old_threshold`.
    pub fn raised_threshold(&self, old_threshold: f64, rejected_value: f64) -> f64 {
        let proposed = rejected_value + self.config.safety_margin * rejected_value.abs();
        let cap = old_threshold + self.config.max_change_ratio * old_threshold.abs();
        if proposed > cap {
            warn!(
                "Capping threshold increase at {:.0}% of original value",
                self.config.max_change_ratio * 100.0
            );
        }
        round2(proposed.min(cap)).max(old_threshold)
    }

    /// New threshold for a lower-bound rule (`<` / `<=`)
    ///
    /// Mirror of [`raised_threshold`](Self::raised_threshold); never above
    /// `old_threshold`.
    pub fn lowered_threshold(&self, old_threshold: f64, rejected_value: f64) -> f64 {
        let proposed = rejected_value - self.config.safety_margin * rejected_value.abs();
        let floor = old_threshold - self.config.max_change_ratio * old_threshold.abs();
        if proposed < floor {
            warn!(
                "Capping threshold decrease at {:.0}% of original value",
                self.config.max_change_ratio * 100.0
            );
        }
        round2(proposed.max(floor)).min(old_threshold)
    }

    /// Relax every rule that fired in a rejected trace
    ///
    /// Returns the new table (validated) and one audit record per changed
    /// rule. Rules that no longer exist in `rules` are skipped.
    pub fn adjust(
        &self,
        rules: &RuleSet,
        rejected: &DecisionTrace,
        at: DateTime<Utc>,
    ) -> Result<(RuleSet, Vec<ThresholdAdjustment>), EngineError> {
        let component: Component = rejected.component_id().parse()?;
        let mut next = rules.clone();
        let mut audit = Vec::new();

        for step in rejected.reasoning_trace() {
            let Some(rule) = next.rule(component, step.rule()) else {
                warn!("Rule {} not found for {}, skipping", step.rule(), component);
                continue;
            };

            let old_threshold = rule.threshold;
            let new_threshold = if rule.comparison.is_upper_bound() {
                self.raised_threshold(old_threshold, step.feature_value())
            } else {
                self.lowered_threshold(old_threshold, step.feature_value())
            };
            let feature = rule.feature.clone();

            let Some(updated) = next.with_threshold(component, step.rule(), new_threshold) else {
                continue;
            };
            next = updated;

            info!(
                "Adjusted {}: {} -> {} (rejected value {})",
                step.rule(),
                old_threshold,
                new_threshold,
                step.feature_value()
            );

            audit.push(ThresholdAdjustment {
                rule: step.rule().to_string(),
                component,
                feature,
                old_threshold,
                new_threshold,
                rejected_value: step.feature_value(),
                timestamp: at,
                reason: REJECTION_REASON.to_string(),
            });
        }

        next.validate()?;
        Ok((next, audit))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
