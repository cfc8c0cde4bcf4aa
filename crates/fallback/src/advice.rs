//! Templated maintenance advice

use crate::retrieval::KnowledgeRecord;
use alerting::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use trace_engine::{Decision, DecisionTrace};
use tracing::debug;

const DEFAULT_REFERENCE: &str = "Internal Knowledge Base";

const LOCKOUT_NOTE: &str =
    "Before inspecting, ensure the machine is powered down and locked out to prevent injury.";

const ROUTINE_NOTE: &str = "No intervention required; follow standard site safety procedures.";

/// Advice generation errors
#[derive(Error, Debug)]
pub enum AdviceError {
    /// Trace document is internally inconsistent
    #[error("Invalid trace {alert_id}: {reason}")]
    InvalidTrace { alert_id: String, reason: String },

    /// Generator backend failed
    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Maintenance advice for one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub alert_id: String,
    pub component_id: String,
    pub decision: Decision,
    pub severity: Severity,
    pub confidence_percent: u8,
    pub recommended_action: Vec<String>,
    pub safety_note: String,
    pub reference: String,
    /// Name of the advisor that produced this recommendation
    pub advisor: String,
}

impl Recommendation {
    /// Plain-text rendering for operators and the interaction log
    pub fn explanation(&self) -> String {
        let mut text = format!(
            "{} {} ({}, {}% confidence)\nRecommended action:\n",
            self.component_id, self.decision, self.severity, self.confidence_percent
        );
        for action in &self.recommended_action {
            text.push_str("- ");
            text.push_str(action);
            text.push('\n');
        }
        text.push_str(&format!("Safety: {}\nReference: {}", self.safety_note, self.reference));
        text
    }
}

/// Produces advice from a finalized trace and retrieved context
///
/// Implementations only read the trace; it is never modified or re-evaluated.
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    fn advise(
        &self,
        trace: &DecisionTrace,
        context: &[&KnowledgeRecord],
    ) -> Result<Recommendation, AdviceError>;
}

/// Advisor built from fixed per-feature action templates
#[derive(Debug, Clone, Default)]
pub struct TemplateAdvisor;

impl TemplateAdvisor {
    pub fn new() -> Self {
        Self
    }

    fn feature_action(feature: &str, component: &str, rule: &str) -> String {
        match feature {
            "vibration_rms" => format!(
                "Inspect {} bearings and check lubrication levels immediately.",
                component
            ),
            "vibration_trend" => format!(
                "Schedule a vibration analysis on the {}; a rising trend points to \
                 progressive bearing or alignment wear.",
                component
            ),
            "vibration_delta" => format!(
                "Check {} mountings, couplings and belt tension for the sudden vibration change.",
                component
            ),
            "temperature_c" => format!(
                "Verify {} cooling and ventilation against the rated operating temperature.",
                component
            ),
            "temperature_delta" => format!(
                "Investigate rapid warming of the {}: check lubrication and friction sources.",
                component
            ),
            "load_avg" => format!(
                "Reduce or redistribute {} load and check for blockages or overload conditions.",
                component
            ),
            other => format!("Review the {} reading that triggered {}.", other, rule),
        }
    }

    fn escalation(decision: Decision) -> Option<&'static str> {
        match decision {
            Decision::Danger => Some(
                "Plan a maintenance stop within 24 hours and schedule part replacement \
                 within 5-10 days if symptoms persist.",
            ),
            Decision::Borderline => {
                Some("Increase monitoring frequency and re-evaluate at the next shift.")
            }
            Decision::Normal => None,
        }
    }
}

impl Advisor for TemplateAdvisor {
    fn name(&self) -> &str {
        "template"
    }

    fn advise(
        &self,
        trace: &DecisionTrace,
        context: &[&KnowledgeRecord],
    ) -> Result<Recommendation, AdviceError> {
        check_consistency(trace)?;

        let component = trace.component_id().to_lowercase();
        let mut actions: Vec<String> = Vec::new();
        let mut features: Vec<&str> = Vec::new();

        for step in trace.reasoning_trace() {
            if features.contains(&step.feature()) {
                continue;
            }
            features.push(step.feature());
            actions.push(Self::feature_action(step.feature(), &component, step.rule()));
        }

        if let Some(line) = Self::escalation(trace.decision()) {
            actions.push(line.to_string());
        }

        if features.is_empty() {
            actions.push(format!(
                "No maintenance action required; continue routine monitoring of the {}.",
                component
            ));
        } else {
            actions.push(format!(
                "Monitor {} behaviour and {} trends closely.",
                trace.observed_behavior().as_str().to_lowercase(),
                features.join(", ")
            ));
        }

        let citations: BTreeSet<String> = context.iter().filter_map(|r| r.citation()).collect();
        let reference = if citations.is_empty() {
            DEFAULT_REFERENCE.to_string()
        } else {
            citations.into_iter().collect::<Vec<_>>().join(", ")
        };

        let safety_note = if trace.decision() == Decision::Normal {
            ROUTINE_NOTE
        } else {
            LOCKOUT_NOTE
        };

        debug!("Templated {} actions for {}", actions.len(), trace.alert_id());

        Ok(Recommendation {
            alert_id: trace.alert_id().to_string(),
            component_id: trace.component_id().to_string(),
            decision: trace.decision(),
            severity: Severity::from_confidence(trace.final_confidence()),
            confidence_percent: Severity::as_percentage(trace.final_confidence()),
            recommended_action: actions,
            safety_note: safety_note.to_string(),
            reference,
            advisor: self.name().to_string(),
        })
    }
}

/// Reject traces whose rule list and steps disagree (e.g. hand-edited files)
fn check_consistency(trace: &DecisionTrace) -> Result<(), AdviceError> {
    let steps = trace.reasoning_trace();
    let rules = trace.rules_triggered();

    let consistent = steps.len() == rules.len()
        && steps.iter().zip(rules).all(|(step, rule)| step.rule() == rule);

    if !consistent {
        return Err(AdviceError::InvalidTrace {
            alert_id: trace.alert_id().to_string(),
            reason: "rules_triggered does not match reasoning_trace".to_string(),
        });
    }
    Ok(())
}
