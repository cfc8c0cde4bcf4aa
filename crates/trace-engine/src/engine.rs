//! Rule Evaluator
//!
//! Maps one feature record to one decision trace. Evaluation is a single
//! pass over the component's rule list in definition order; the running
//! confidence is threaded through a fold and discarded afterwards, so every
//! trace depends only on its record and the rule table.

use crate::config::{DecisionThresholds, EngineConfig};
use crate::error::EngineError;
use crate::record::{Component, FeatureRecord};
use crate::rules::{Rule, RuleSet, RuleTier};
use crate::trace::{Behavior, DecisionTrace, ReasoningStep};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Namespace for alert identifiers derived from component and timestamp
const ALERT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_83d5_4b7a_9e02_c4d1_7b35_a960);

/// Confidence is kept at this many decimal places after each step
const CONFIDENCE_SCALE: f64 = 10_000.0;

/// Deterministic rule evaluator
///
/// Holds only read-only data, so a single engine can be shared behind an
/// `Arc` by any number of concurrent callers.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: RuleSet,
    thresholds: DecisionThresholds,
}

/// Running state of one evaluation pass
struct Pass {
    steps: Vec<ReasoningStep>,
    confidence: f64,
    observed: Behavior,
}

impl RuleEngine {
    /// Create an engine over a validated rule table
    pub fn new(rules: RuleSet, thresholds: DecisionThresholds) -> Result<Self, EngineError> {
        rules.validate()?;
        info!(
            "Creating rule engine: {} rules, borderline {}, danger {}",
            rules.rule_count(),
            thresholds.borderline(),
            thresholds.danger()
        );
        Ok(Self { rules, thresholds })
    }

    /// Create an engine using the thresholds from configuration
    pub fn from_config(rules: RuleSet, config: &EngineConfig) -> Result<Self, EngineError> {
        Self::new(rules, config.thresholds()?)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn thresholds(&self) -> DecisionThresholds {
        self.thresholds
    }

    /// Evaluate one record into a decision trace
    pub fn evaluate(&self, record: &FeatureRecord) -> Result<DecisionTrace, EngineError> {
        let component = record.component()?;
        let instant = record.instant()?;

        let (rules, expected) = match self.rules.for_component(component) {
            Some(entry) => (entry.rules.as_slice(), entry.expected_behavior),
            None => (&[][..], Behavior::default()),
        };

        // Every referenced feature must be present before any step is taken
        let observations = rules
            .iter()
            .map(|rule| {
                record
                    .feature(&rule.feature)
                    .map(|value| (rule, value))
                    .ok_or_else(|| EngineError::MissingFeature {
                        component: component.to_string(),
                        rule: rule.rule.clone(),
                        feature: rule.feature.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let start = Pass {
            steps: Vec::with_capacity(rules.len()),
            confidence: 0.0,
            observed: Behavior::Stable,
        };
        let pass = observations
            .into_iter()
            .fold(start, |pass, (rule, value)| apply(pass, rule, value));

        let decision = self.thresholds.classify(pass.confidence);
        let trace = DecisionTrace::assemble(
            alert_id(component, &instant),
            component.to_string(),
            record.timestamp.clone(),
            decision,
            pass.steps,
            expected,
            pass.observed,
        );

        debug!(
            "Evaluated {} at {}: {} ({:.4}) after {} steps",
            component,
            record.timestamp,
            trace.decision(),
            trace.final_confidence(),
            trace.reasoning_trace().len()
        );

        Ok(trace)
    }
}

/// Apply one rule to the running pass
fn apply(mut pass: Pass, rule: &Rule, value: f64) -> Pass {
    if !rule.is_enabled(&pass.steps) || !rule.matches(value) {
        return pass;
    }

    let confidence = accumulate(pass.confidence, rule.confidence_delta);
    debug!(
        "Rule {} fired: {} = {} {} {} -> confidence {:.4}",
        rule.rule, rule.feature, value, rule.comparison, rule.threshold, confidence
    );

    pass.steps.push(ReasoningStep::fired(
        pass.steps.len() + 1,
        &rule.rule,
        &rule.feature,
        value,
        rule.comparison,
        rule.threshold,
        rule.confidence_delta,
        confidence,
    ));
    pass.confidence = confidence;
    pass.observed = pass.observed.max(match rule.tier {
        RuleTier::Watch => Behavior::Drifting,
        RuleTier::Danger => Behavior::Degrading,
    });
    pass
}

/// Add a rule's contribution, rounded and clamped to [0, 1]
fn accumulate(confidence: f64, delta: f64) -> f64 {
    (((confidence + delta) * CONFIDENCE_SCALE).round() / CONFIDENCE_SCALE).clamp(0.0, 1.0)
}

fn alert_id(component: Component, instant: &DateTime<Utc>) -> String {
    let name = format!(
        "{}|{}",
        component,
        instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    Uuid::new_v5(&ALERT_NAMESPACE, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Comparison, ComponentRules};
    use crate::trace::Decision;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn record(component: Component, features: &[(&str, f64)]) -> FeatureRecord {
        FeatureRecord::new(
            "2024-05-01T10:15:00Z",
            component,
            features.iter().map(|(k, v)| (k.to_string(), *v)),
        )
    }

    fn pump_record(
        vibration_rms: f64,
        temperature_delta: f64,
        temperature_c: f64,
        load_avg: f64,
    ) -> FeatureRecord {
        record(
            Component::Pump,
            &[
                ("vibration_rms", vibration_rms),
                ("temperature_delta", temperature_delta),
                ("temperature_c", temperature_c),
                ("load_avg", load_avg),
            ],
        )
    }

    fn default_engine() -> RuleEngine {
        RuleEngine::new(RuleSet::default(), DecisionThresholds::default()).unwrap()
    }

    /// Moderate vibration followed by a thermal rule that only counts once vibration fired
    fn vibration_then_thermal() -> RuleEngine {
        let rules = RuleSet::new([(
            Component::Pump,
            ComponentRules::new(vec![
                Rule::new(
                    "MODERATE_VIBRATION",
                    "vibration_trend",
                    Comparison::GreaterThan,
                    0.5,
                    0.45,
                    RuleTier::Watch,
                ),
                Rule::new(
                    "THERMAL_CONFIRMATION",
                    "temperature_delta",
                    Comparison::GreaterThan,
                    0.75,
                    0.37,
                    RuleTier::Danger,
                )
                .requiring("MODERATE_VIBRATION"),
            ]),
        )]);
        RuleEngine::new(rules, DecisionThresholds::new(0.4, 0.8).unwrap()).unwrap()
    }

    #[test]
    fn test_conditional_scenario() {
        let engine = vibration_then_thermal();
        let trace = engine
            .evaluate(&record(
                Component::Pump,
                &[("vibration_trend", 0.61), ("temperature_delta", 0.82)],
            ))
            .unwrap();

        let confidences: Vec<f64> = trace
            .reasoning_trace()
            .iter()
            .map(|s| s.confidence_after_step())
            .collect();
        assert_eq!(confidences, vec![0.45, 0.82]);
        assert_eq!(trace.final_confidence(), 0.82);
        assert_eq!(trace.decision(), Decision::Danger);
        assert_eq!(trace.rules_triggered(), ["MODERATE_VIBRATION", "THERMAL_CONFIRMATION"]);
        assert_eq!(trace.observed_behavior(), Behavior::Degrading);
        assert!(trace.expectation_mismatch());

        let steps = trace.reasoning_trace();
        assert_eq!(steps[0].step(), 1);
        assert_eq!(steps[1].step(), 2);
        assert_eq!(steps[1].feature_value(), 0.82);
        assert_eq!(steps[1].threshold(), 0.75);
    }

    #[test]
    fn test_conditional_rule_needs_prerequisite() {
        let engine = vibration_then_thermal();
        let trace = engine
            .evaluate(&record(
                Component::Pump,
                &[("vibration_trend", 0.3), ("temperature_delta", 0.9)],
            ))
            .unwrap();

        assert!(trace.is_quiet());
        assert_eq!(trace.decision(), Decision::Normal);
    }

    #[test]
    fn test_no_rule_fires() {
        let trace = default_engine()
            .evaluate(&pump_record(1.0, 0.5, 60.0, 40.0))
            .unwrap();

        assert!(trace.reasoning_trace().is_empty());
        assert!(trace.rules_triggered().is_empty());
        assert_eq!(trace.final_confidence(), 0.0);
        assert_eq!(trace.decision(), Decision::Normal);
        assert_eq!(trace.observed_behavior(), Behavior::Stable);
        assert!(!trace.expectation_mismatch());
    }

    #[test]
    fn test_watch_rule_only() {
        let trace = default_engine()
            .evaluate(&pump_record(1.0, 6.0, 60.0, 40.0))
            .unwrap();

        assert_eq!(trace.rules_triggered(), ["PUMP_TEMP_SPIKE"]);
        assert_eq!(trace.final_confidence(), 0.3);
        assert_eq!(trace.decision(), Decision::Normal);
        assert_eq!(trace.observed_behavior(), Behavior::Drifting);
        assert!(trace.expectation_mismatch());
    }

    #[test]
    fn test_confidence_clamped_at_one() {
        // 0.35 + 0.3 + 0.4 + 0.2 exceeds 1.0
        let trace = default_engine()
            .evaluate(&pump_record(5.2, 7.0, 101.0, 90.0))
            .unwrap();

        let confidences: Vec<f64> = trace
            .reasoning_trace()
            .iter()
            .map(|s| s.confidence_after_step())
            .collect();
        assert_eq!(confidences, vec![0.35, 0.65, 1.0, 1.0]);
        assert_eq!(trace.final_confidence(), 1.0);
        assert_eq!(trace.decision(), Decision::Danger);
    }

    #[test]
    fn test_rules_reported_in_definition_order() {
        let trace = default_engine()
            .evaluate(&record(
                Component::Compressor,
                &[
                    ("temperature_c", 58.0),
                    ("vibration_rms", 8.1),
                    ("temperature_delta", 1.0),
                    ("load_avg", 99.0),
                ],
            ))
            .unwrap();

        assert_eq!(
            trace.rules_triggered(),
            ["COMP_DISCHARGE_TEMP", "COMP_VIB_INSTABILITY", "COMP_OVERLOAD"]
        );
        assert_eq!(trace.final_confidence(), 1.0);
        assert_eq!(trace.component_id(), "COMPRESSOR");
    }

    #[test]
    fn test_missing_feature() {
        let result = default_engine().evaluate(&record(
            Component::Conveyor,
            &[("vibration_trend", 2.0), ("temperature_c", 85.0), ("load_avg", 50.0)],
        ));

        assert_eq!(
            result,
            Err(EngineError::MissingFeature {
                component: "CONVEYOR".into(),
                rule: "CONVEYOR_VIB_SPIKE".into(),
                feature: "vibration_delta".into(),
            })
        );
    }

    #[test]
    fn test_missing_feature_of_conditional_rule() {
        // Prerequisite does not fire, but the feature is still referenced
        let result = vibration_then_thermal()
            .evaluate(&record(Component::Pump, &[("vibration_trend", 0.1)]));
        assert!(matches!(result, Err(EngineError::MissingFeature { .. })));
    }

    #[test]
    fn test_unknown_component() {
        let mut input = pump_record(1.0, 1.0, 1.0, 1.0);
        input.component = "TURBINE".into();
        assert_eq!(
            default_engine().evaluate(&input),
            Err(EngineError::UnknownComponent("TURBINE".into()))
        );
    }

    #[test]
    fn test_invalid_timestamp() {
        let mut input = pump_record(1.0, 1.0, 1.0, 1.0);
        input.timestamp = "not a time".into();
        assert!(matches!(
            default_engine().evaluate(&input),
            Err(EngineError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_component_without_rules() {
        let rules = RuleSet::new([(Component::Pump, ComponentRules::default())]);
        let engine = RuleEngine::new(rules, DecisionThresholds::default()).unwrap();
        let trace = engine.evaluate(&record(Component::Conveyor, &[])).unwrap();
        assert!(trace.is_quiet());
        assert_eq!(trace.decision(), Decision::Normal);
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let rules = RuleSet::new([(
            Component::Pump,
            ComponentRules::new(vec![Rule::new(
                "A", "load_avg", Comparison::GreaterThan, 1.0, -0.5, RuleTier::Watch,
            )]),
        )]);
        let err = RuleEngine::new(rules, DecisionThresholds::default()).unwrap_err();
        assert!(err.is_configuration_error());

        let config = EngineConfig {
            borderline_threshold: 0.9,
            danger_threshold: 0.3,
            rules_path: None,
        };
        let err = RuleEngine::from_config(RuleSet::default(), &config).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_expected_behavior_from_table() {
        let rules = RuleSet::new([(
            Component::Conveyor,
            ComponentRules::new(vec![Rule::new(
                "BELT_WEAR", "vibration_trend", Comparison::GreaterThan, 1.0, 0.3, RuleTier::Watch,
            )])
            .with_expected_behavior(Behavior::Drifting),
        )]);
        let engine = RuleEngine::new(rules, DecisionThresholds::default()).unwrap();

        let drifting = engine
            .evaluate(&record(Component::Conveyor, &[("vibration_trend", 1.4)]))
            .unwrap();
        assert_eq!(drifting.expected_behavior(), Behavior::Drifting);
        assert!(!drifting.expectation_mismatch());

        let stable = engine
            .evaluate(&record(Component::Conveyor, &[("vibration_trend", 0.2)]))
            .unwrap();
        assert!(stable.expectation_mismatch());
    }

    #[test]
    fn test_alert_id_is_derived_from_input() {
        let engine = default_engine();
        let a = engine.evaluate(&pump_record(1.0, 1.0, 1.0, 1.0)).unwrap();
        let b = engine.evaluate(&pump_record(9.0, 9.0, 99.0, 99.0)).unwrap();
        // Same component and instant, different readings
        assert_eq!(a.alert_id(), b.alert_id());

        let mut shifted = pump_record(1.0, 1.0, 1.0, 1.0);
        shifted.timestamp = "2024-05-01T12:15:00+02:00".into();
        let c = engine.evaluate(&shifted).unwrap();
        assert_eq!(a.alert_id(), c.alert_id());
        assert_eq!(c.timestamp(), "2024-05-01T12:15:00+02:00");

        let other = engine
            .evaluate(&record(
                Component::Conveyor,
                &[
                    ("vibration_trend", 0.0),
                    ("temperature_c", 0.0),
                    ("load_avg", 0.0),
                    ("vibration_delta", 0.0),
                ],
            ))
            .unwrap();
        assert_ne!(a.alert_id(), other.alert_id());
        assert!(Uuid::parse_str(a.alert_id()).is_ok());
    }

    #[test]
    fn test_shared_engine_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuleEngine>();

        let engine = Arc::new(default_engine());
        let inputs: Vec<FeatureRecord> = (0..16)
            .map(|i| {
                let i = i as f64;
                pump_record(i * 0.5, i, 80.0 + i * 2.0, 70.0 + i * 2.0)
            })
            .collect();
        let sequential: Vec<String> = inputs
            .iter()
            .map(|r| engine.evaluate(r).unwrap().to_json().unwrap())
            .collect();

        let concurrent: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|r| {
                    let engine = Arc::clone(&engine);
                    scope.spawn(move || engine.evaluate(r).unwrap().to_json().unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(sequential, concurrent);
    }

    fn arb_pump_record() -> impl Strategy<Value = FeatureRecord> {
        (0.0..12.0f64, 0.0..12.0f64, 20.0..120.0f64, 0.0..110.0f64)
            .prop_map(|(vib, dt, temp, load)| pump_record(vib, dt, temp, load))
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_deterministic(input in arb_pump_record()) {
            let engine = default_engine();
            let first = engine.evaluate(&input).unwrap().to_json().unwrap();
            let second = engine.evaluate(&input).unwrap().to_json().unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_trace_invariants(input in arb_pump_record()) {
            let trace = default_engine().evaluate(&input).unwrap();
            let steps = trace.reasoning_trace();

            prop_assert_eq!(trace.rules_triggered().len(), steps.len());
            for (i, (name, step)) in trace.rules_triggered().iter().zip(steps).enumerate() {
                prop_assert_eq!(name.as_str(), step.rule());
                prop_assert_eq!(step.step(), i + 1);
            }
            for pair in steps.windows(2) {
                prop_assert!(pair[0].confidence_after_step() <= pair[1].confidence_after_step());
            }

            let last = steps.last().map_or(0.0, |s| s.confidence_after_step());
            prop_assert_eq!(trace.final_confidence(), last);
            prop_assert!((0.0..=1.0).contains(&trace.final_confidence()));
        }

        #[test]
        fn prop_decision_matches_thresholds(input in arb_pump_record()) {
            let engine = default_engine();
            let trace = engine.evaluate(&input).unwrap();
            let expected = engine.thresholds().classify(trace.final_confidence());
            prop_assert_eq!(trace.decision(), expected);
        }
    }
}
