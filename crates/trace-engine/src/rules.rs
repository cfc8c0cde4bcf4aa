//! Static rule table
//!
//! Rules are hand-authored data: a named predicate over one feature and a
//! threshold, carrying a fixed confidence contribution. Each component owns an
//! ordered list, and that order is the order rules are evaluated and reported
//! in.

use crate::error::RuleConfigError;
use crate::record::Component;
use crate::trace::{Behavior, ReasoningStep};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Comparison applied as `feature_value <op> threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl Comparison {
    /// Apply the comparison
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::GreaterThan => value > threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::LessThan => value < threshold,
            Comparison::LessOrEqual => value <= threshold,
        }
    }

    /// Whether larger values move towards firing
    pub fn is_upper_bound(&self) -> bool {
        matches!(self, Comparison::GreaterThan | Comparison::GreaterOrEqual)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::GreaterThan => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::LessThan => "<",
            Comparison::LessOrEqual => "<=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Severity tier of a rule; a firing DANGER rule marks the component as degrading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleTier {
    #[default]
    Watch,
    Danger,
}

/// A single threshold rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name, unique within its component
    pub rule: String,
    /// Feature the predicate reads
    pub feature: String,
    pub comparison: Comparison,
    pub threshold: f64,
    /// Confidence added when the rule fires (non-negative)
    pub confidence_delta: f64,
    #[serde(default)]
    pub tier: RuleTier,
    /// Earlier rule that must have fired in the same pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
}

impl Rule {
    /// Create an unconditional rule
    pub fn new(
        rule: impl Into<String>,
        feature: impl Into<String>,
        comparison: Comparison,
        threshold: f64,
        confidence_delta: f64,
        tier: RuleTier,
    ) -> Self {
        Self {
            rule: rule.into(),
            feature: feature.into(),
            comparison,
            threshold,
            confidence_delta,
            tier,
            requires: None,
        }
    }

    /// Make this rule conditional on another rule having fired first
    pub fn requiring(mut self, rule: impl Into<String>) -> Self {
        self.requires = Some(rule.into());
        self
    }

    /// Whether the prerequisite (if any) is among the steps recorded so far
    pub fn is_enabled(&self, steps: &[ReasoningStep]) -> bool {
        match &self.requires {
            Some(required) => steps.iter().any(|step| step.rule() == required),
            None => true,
        }
    }

    /// Evaluate the threshold predicate
    pub fn matches(&self, value: f64) -> bool {
        self.comparison.holds(value, self.threshold)
    }
}

/// Ordered rules and expected behavior for one component
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentRules {
    /// Behavior the component is expected to show in its declared state
    #[serde(default)]
    pub expected_behavior: Behavior,
    pub rules: Vec<Rule>,
}

impl ComponentRules {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            expected_behavior: Behavior::default(),
            rules,
        }
    }

    pub fn with_expected_behavior(mut self, behavior: Behavior) -> Self {
        self.expected_behavior = behavior;
        self
    }
}

/// Complete rule table, keyed by component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    components: BTreeMap<Component, ComponentRules>,
}

impl RuleSet {
    /// Build a rule table from per-component rule lists
    pub fn new(components: impl IntoIterator<Item = (Component, ComponentRules)>) -> Self {
        Self {
            components: components.into_iter().collect(),
        }
    }

    /// Parse a rule table from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, RuleConfigError> {
        let set: RuleSet =
            serde_json::from_str(json).map_err(|e| RuleConfigError::Parse(e.to_string()))?;
        set.validate()?;
        Ok(set)
    }

    /// Serialize the rule table as pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String, RuleConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| RuleConfigError::Parse(e.to_string()))
    }

    /// Rules configured for a component
    pub fn for_component(&self, component: Component) -> Option<&ComponentRules> {
        self.components.get(&component)
    }

    pub fn components(&self) -> impl Iterator<Item = (Component, &ComponentRules)> {
        self.components.iter().map(|(c, r)| (*c, r))
    }

    /// Total number of rules across components
    pub fn rule_count(&self) -> usize {
        self.components.values().map(|c| c.rules.len()).sum()
    }

    /// Look up a rule by component and name
    pub fn rule(&self, component: Component, name: &str) -> Option<&Rule> {
        self.components
            .get(&component)?
            .rules
            .iter()
            .find(|r| r.rule == name)
    }

    /// Current threshold of a rule
    pub fn threshold(&self, component: Component, name: &str) -> Option<f64> {
        self.rule(component, name).map(|r| r.threshold)
    }

    /// Copy of this table with one threshold replaced
    ///
    /// Returns `None` when the rule does not exist.
    pub fn with_threshold(&self, component: Component, name: &str, threshold: f64) -> Option<Self> {
        let mut next = self.clone();
        let rule = next
            .components
            .get_mut(&component)?
            .rules
            .iter_mut()
            .find(|r| r.rule == name)?;
        rule.threshold = threshold;
        Some(next)
    }

    /// Check structural invariants of the table
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        for (component, entry) in &self.components {
            let mut seen: HashSet<&str> = HashSet::new();

            for rule in &entry.rules {
                if rule.rule.trim().is_empty() {
                    return Err(RuleConfigError::EmptyName("rule"));
                }
                if rule.feature.trim().is_empty() {
                    return Err(RuleConfigError::EmptyName("feature"));
                }
                if !rule.threshold.is_finite() {
                    return Err(RuleConfigError::NonFinite {
                        rule: rule.rule.clone(),
                        field: "threshold",
                    });
                }
                if !rule.confidence_delta.is_finite() {
                    return Err(RuleConfigError::NonFinite {
                        rule: rule.rule.clone(),
                        field: "confidence_delta",
                    });
                }
                if rule.confidence_delta < 0.0 {
                    return Err(RuleConfigError::NegativeDelta {
                        rule: rule.rule.clone(),
                        delta: rule.confidence_delta,
                    });
                }
                // Prerequisites must appear earlier, otherwise they can never have fired
                if let Some(required) = &rule.requires {
                    if !seen.contains(required.as_str()) {
                        return Err(RuleConfigError::UnresolvedDependency {
                            component: component.to_string(),
                            rule: rule.rule.clone(),
                            requires: required.clone(),
                        });
                    }
                }
                if !seen.insert(rule.rule.as_str()) {
                    return Err(RuleConfigError::DuplicateRule {
                        component: component.to_string(),
                        rule: rule.rule.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for RuleSet {
    /// Reference rule table for the demo plant
    fn default() -> Self {
        use Comparison::GreaterThan as Gt;
        use RuleTier::{Danger, Watch};

        RuleSet::new([
            (
                Component::Pump,
                ComponentRules::new(vec![
                    Rule::new("PUMP_VIBRATION_CRITICAL", "vibration_rms", Gt, 4.0, 0.35, Danger),
                    Rule::new("PUMP_TEMP_SPIKE", "temperature_delta", Gt, 5.0, 0.3, Watch),
                    Rule::new("PUMP_OVERHEAT", "temperature_c", Gt, 95.0, 0.4, Danger),
                    Rule::new("PUMP_HIGH_LOAD", "load_avg", Gt, 85.0, 0.2, Watch),
                ]),
            ),
            (
                Component::Conveyor,
                ComponentRules::new(vec![
                    Rule::new("CONVEYOR_VIB_TRENDING", "vibration_trend", Gt, 1.5, 0.25, Watch),
                    Rule::new("CONVEYOR_MOTOR_HEAT", "temperature_c", Gt, 80.0, 0.3, Watch),
                    Rule::new("CONVEYOR_LOAD_PEAK", "load_avg", Gt, 90.0, 0.2, Watch),
                    Rule::new("CONVEYOR_VIB_SPIKE", "vibration_delta", Gt, 0.8, 0.2, Watch),
                ]),
            ),
            (
                Component::Compressor,
                ComponentRules::new(vec![
                    Rule::new("COMP_DISCHARGE_TEMP", "temperature_c", Gt, 50.0, 0.2, Watch),
                    Rule::new("COMP_VIB_INSTABILITY", "vibration_rms", Gt, 7.44, 0.5, Danger),
                    Rule::new("COMP_RAPID_WARMING", "temperature_delta", Gt, 5.57, 0.2, Watch),
                    Rule::new("COMP_OVERLOAD", "load_avg", Gt, 98.28, 0.35, Danger),
                ]),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        let rules = RuleSet::default();
        assert!(rules.validate().is_ok());
        assert_eq!(rules.rule_count(), 12);
        for component in Component::ALL {
            assert_eq!(rules.for_component(component).unwrap().rules.len(), 4);
        }
    }

    #[test]
    fn test_comparisons() {
        assert!(Comparison::GreaterThan.holds(4.1, 4.0));
        assert!(!Comparison::GreaterThan.holds(4.0, 4.0));
        assert!(Comparison::GreaterOrEqual.holds(4.0, 4.0));
        assert!(Comparison::LessThan.holds(3.9, 4.0));
        assert!(!Comparison::LessThan.holds(4.0, 4.0));
        assert!(Comparison::LessOrEqual.holds(4.0, 4.0));
        assert!(!Comparison::GreaterThan.holds(f64::NAN, 4.0));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let rules = RuleSet::new([(
            Component::Pump,
            ComponentRules::new(vec![
                Rule::new(
                    "A",
                    "vibration_rms",
                    Comparison::GreaterThan,
                    1.0,
                    0.1,
                    RuleTier::Watch,
                ),
                Rule::new(
                    "A",
                    "load_avg",
                    Comparison::GreaterThan,
                    1.0,
                    0.1,
                    RuleTier::Watch,
                ),
            ]),
        )]);
        assert!(matches!(
            rules.validate(),
            Err(RuleConfigError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn test_empty_names_rejected() {
        let table = |rule: &str, feature: &str| {
            RuleSet::new([(
                Component::Conveyor,
                ComponentRules::new(vec![Rule::new(
                    rule,
                    feature,
                    Comparison::GreaterThan,
                    1.0,
                    0.1,
                    RuleTier::Watch,
                )]),
            )])
        };

        assert_eq!(table("  ", "load_avg").validate(), Err(RuleConfigError::EmptyName("rule")));
        assert_eq!(table("PEAK", "").validate(), Err(RuleConfigError::EmptyName("feature")));

        let json = r#"{"CONVEYOR": {"rules": [
            {"rule": "", "feature": "load_avg", "comparison": ">",
             "threshold": 1.0, "confidence_delta": 0.1}
        ]}}"#;
        assert_eq!(RuleSet::from_json(json), Err(RuleConfigError::EmptyName("rule")));
    }

    #[test]
    fn test_same_name_allowed_across_components() {
        let rule = Rule::new(
            "HEAT",
            "temperature_c",
            Comparison::GreaterThan,
            1.0,
            0.1,
            RuleTier::Watch,
        );
        let rules = RuleSet::new([
            (Component::Pump, ComponentRules::new(vec![rule.clone()])),
            (Component::Compressor, ComponentRules::new(vec![rule])),
        ]);
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let rules = RuleSet::new([(
            Component::Pump,
            ComponentRules::new(vec![
                Rule::new(
                    "B",
                    "temperature_delta",
                    Comparison::GreaterThan,
                    1.0,
                    0.1,
                    RuleTier::Watch,
                )
                .requiring("A"),
                Rule::new(
                    "A",
                    "vibration_trend",
                    Comparison::GreaterThan,
                    1.0,
                    0.1,
                    RuleTier::Watch,
                ),
            ]),
        )]);
        assert!(matches!(
            rules.validate(),
            Err(RuleConfigError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_negative_and_non_finite_values_rejected() {
        let negative = RuleSet::new([(
            Component::Pump,
            ComponentRules::new(vec![Rule::new(
                "A", "load_avg", Comparison::GreaterThan, 1.0, -0.1, RuleTier::Watch,
            )]),
        )]);
        assert!(matches!(
            negative.validate(),
            Err(RuleConfigError::NegativeDelta { .. })
        ));

        let nan = RuleSet::new([(
            Component::Pump,
            ComponentRules::new(vec![Rule::new(
                "A", "load_avg", Comparison::GreaterThan, f64::NAN, 0.1, RuleTier::Watch,
            )]),
        )]);
        assert!(matches!(nan.validate(), Err(RuleConfigError::NonFinite { .. })));
    }

    #[test]
    fn test_json_table() {
        let json = r#"{
            "PUMP": {
                "expected_behavior": "STABLE",
                "rules": [
                    { "rule": "PUMP_VIB", "feature": "vibration_rms", "comparison": ">",
                      "threshold": 4.0, "confidence_delta": 0.35, "tier": "DANGER" },
                    { "rule": "PUMP_HEAT", "feature": "temperature_delta", "comparison": ">=",
                      "threshold": 5.0, "confidence_delta": 0.3, "requires": "PUMP_VIB" }
                ]
            }
        }"#;
        let rules = RuleSet::from_json(json).unwrap();
        let heat = rules.rule(Component::Pump, "PUMP_HEAT").unwrap();
        assert_eq!(heat.comparison, Comparison::GreaterOrEqual);
        assert_eq!(heat.tier, RuleTier::Watch);
        assert_eq!(heat.requires.as_deref(), Some("PUMP_VIB"));

        let reparsed = RuleSet::from_json(&rules.to_json_pretty().unwrap()).unwrap();
        assert_eq!(reparsed, rules);

        assert!(matches!(
            RuleSet::from_json("{\"TURBINE\": {\"rules\": []}}"),
            Err(RuleConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_with_threshold_leaves_original_untouched() {
        let rules = RuleSet::default();
        let updated = rules
            .with_threshold(Component::Pump, "PUMP_VIBRATION_CRITICAL", 4.5)
            .unwrap();

        assert_eq!(rules.threshold(Component::Pump, "PUMP_VIBRATION_CRITICAL"), Some(4.0));
        assert_eq!(updated.threshold(Component::Pump, "PUMP_VIBRATION_CRITICAL"), Some(4.5));
        assert!(rules.with_threshold(Component::Pump, "NO_SUCH_RULE", 1.0).is_none());
    }
}
