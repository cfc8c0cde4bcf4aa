//! Engine Error Types

use thiserror::Error;

/// Problems with a rule table or the decision thresholds applied to it
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleConfigError {
    /// Two rules of the same component share a name
    #[error("Duplicate rule {rule} for component {component}")]
    DuplicateRule { component: String, rule: String },

    /// A conditional rule depends on a rule that is not defined before it
    #[error("Rule {rule} requires {requires}, which is not defined earlier for {component}")]
    UnresolvedDependency {
        component: String,
        rule: String,
        requires: String,
    },

    /// Confidence contributions must not be negative
    #[error("Rule {rule} has negative confidence delta {delta}")]
    NegativeDelta { rule: String, delta: f64 },

    /// Threshold or delta is NaN or infinite
    #[error("Rule {rule} has non-finite {field}")]
    NonFinite { rule: String, field: &'static str },

    /// Rule or feature name is empty
    #[error("Empty {0} name in rule table")]
    EmptyName(&'static str),

    /// Decision thresholds do not satisfy 0 < borderline < danger <= 1
    #[error("Decision thresholds out of order: borderline {borderline}, danger {danger}")]
    ThresholdOrdering { borderline: f64, danger: f64 },

    /// Rule table document could not be parsed
    #[error("Malformed rule table: {0}")]
    Parse(String),
}

/// Errors returned by the rule evaluator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A feature referenced by a configured rule is absent from the record
    #[error("Missing feature {feature} required by rule {rule} ({component})")]
    MissingFeature {
        component: String,
        rule: String,
        feature: String,
    },

    /// Component tag outside the supported set
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// Record timestamp is not an ISO-8601 instant
    #[error("Invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// Rule table or thresholds are malformed
    #[error("Configuration error: {0}")]
    Configuration(#[from] RuleConfigError),
}

impl EngineError {
    /// Whether the failure was caused by the record being evaluated
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::MissingFeature { .. }
                | EngineError::UnknownComponent(_)
                | EngineError::InvalidTimestamp { .. }
        )
    }

    /// Whether the failure was caused by the rule configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}
