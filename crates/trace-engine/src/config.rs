//! Engine configuration

use crate::error::RuleConfigError;
use crate::trace::Decision;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence at which a record becomes BORDERLINE (default: 0.40)
    pub borderline_threshold: f64,
    /// Confidence at which a record becomes DANGER (default: 0.70)
    pub danger_threshold: f64,
    /// Rule table to load instead of the built-in one
    pub rules_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            borderline_threshold: 0.40,
            danger_threshold: 0.70,
            rules_path: None,
        }
    }
}

impl EngineConfig {
    /// Escalate earlier (lower thresholds)
    pub fn strict() -> Self {
        Self {
            borderline_threshold: 0.25,
            danger_threshold: 0.55,
            ..Default::default()
        }
    }

    /// Escalate later (higher thresholds)
    pub fn lenient() -> Self {
        Self {
            borderline_threshold: 0.50,
            danger_threshold: 0.85,
            ..Default::default()
        }
    }

    /// Validated decision thresholds
    pub fn thresholds(&self) -> Result<DecisionThresholds, RuleConfigError> {
        DecisionThresholds::new(self.borderline_threshold, self.danger_threshold)
    }
}

/// Fixed, non-overlapping confidence bands mapping to a decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionThresholds {
    borderline: f64,
    danger: f64,
}

impl DecisionThresholds {
    /// Requires `0 < borderline < danger <= 1`
    pub fn new(borderline: f64, danger: f64) -> Result<Self, RuleConfigError> {
        let ordered = borderline.is_finite()
            && danger.is_finite()
            && borderline > 0.0
            && borderline < danger
            && danger <= 1.0;

        if !ordered {
            return Err(RuleConfigError::ThresholdOrdering { borderline, danger });
        }
        Ok(Self { borderline, danger })
    }

    pub fn borderline(&self) -> f64 {
        self.borderline
    }

    pub fn danger(&self) -> f64 {
        self.danger
    }

    /// Classify a final confidence
    pub fn classify(&self, confidence: f64) -> Decision {
        if confidence < self.borderline {
            Decision::Normal
        } else if confidence < self.danger {
            Decision::Borderline
        } else {
            Decision::Danger
        }
    }
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            borderline: 0.40,
            danger: 0.70,
        }
    }
}
