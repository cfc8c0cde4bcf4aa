//! Alert deduplication and throttling
//!
//! Time is measured on the event clock: callers pass the instant of the
//! trace being considered, so replaying a batch of historical records
//! gives the same alerts as processing them live.

use crate::severity::Severity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trace_engine::{Decision, DecisionTrace};
use tracing::{debug, info, warn};

/// Alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum trace confidence for an alert (default: 0.40)
    pub confidence_threshold: f64,
    /// Quiet period for repeats of the same component and decision (seconds)
    pub cooldown_seconds: u64,
    /// Alerts allowed per hour window
    pub max_alerts_per_hour: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.40,
            cooldown_seconds: 1800,
            max_alerts_per_hour: 10,
        }
    }
}

/// Why a trace did not raise an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    Normal,
    LowConfidence,
    Throttled,
    Cooldown,
}

/// Last known state of one alert key
#[derive(Debug, Clone, PartialEq)]
pub struct AlertState {
    pub last_fired: DateTime<Utc>,
    pub fire_count: usize,
    pub severity: Severity,
    pub acknowledged: bool,
}

/// Stateful gate in front of alert delivery
///
/// Keyed by component and decision, so a DANGER alert for a pump is not
/// held back by an earlier BORDERLINE one.
#[derive(Debug, Clone)]
pub struct AlertManager {
    config: AlertConfig,
    cooldown: Duration,
    states: BTreeMap<String, AlertState>,
    window_start: Option<DateTime<Utc>>,
    window_count: usize,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        info!(
            "Alert gate: confidence >= {}, cooldown {}s, {} per hour",
            config.confidence_threshold, config.cooldown_seconds, config.max_alerts_per_hour
        );
        Self {
            cooldown: cooldown(config.cooldown_seconds),
            config,
            states: BTreeMap::new(),
            window_start: None,
            window_count: 0,
        }
    }

    /// Deduplication key, e.g. `PUMP:DANGER`
    pub fn key(trace: &DecisionTrace) -> String {
        format!("{}:{}", trace.component_id(), trace.decision())
    }

    /// Reason the trace would be suppressed at `at`, if any
    pub fn check(&self, trace: &DecisionTrace, at: DateTime<Utc>) -> Option<Suppression> {
        if trace.decision() == Decision::Normal {
            return Some(Suppression::Normal);
        }
        if trace.final_confidence() < self.config.confidence_threshold {
            return Some(Suppression::LowConfidence);
        }
        if self.in_window(at) && self.window_count >= self.config.max_alerts_per_hour {
            return Some(Suppression::Throttled);
        }

        match self.states.get(&Self::key(trace)) {
            Some(state) if at - state.last_fired < self.cooldown => Some(Suppression::Cooldown),
            _ => None,
        }
    }

    /// Whether the trace should raise an alert at `at`
    pub fn should_fire(&self, trace: &DecisionTrace, at: DateTime<Utc>) -> bool {
        match self.check(trace, at) {
            None => true,
            Some(Suppression::Throttled) => {
                warn!("Alert throttled: {} alerts in the current hour", self.window_count);
                false
            }
            Some(reason) => {
                debug!("Alert {} suppressed: {:?}", trace.alert_id(), reason);
                false
            }
        }
    }

    /// Record an alert raised for the trace at `at`
    pub fn record_fire(&mut self, trace: &DecisionTrace, at: DateTime<Utc>) {
        if !self.in_window(at) {
            self.window_start = Some(at);
            self.window_count = 0;
        }
        self.window_count += 1;

        let severity = Severity::from_confidence(trace.final_confidence());
        let key = Self::key(trace);
        let state = self.states.entry(key.clone()).or_insert(AlertState {
            last_fired: at,
            fire_count: 0,
            severity,
            acknowledged: false,
        });
        state.last_fired = at;
        state.fire_count += 1;
        state.severity = severity;
        state.acknowledged = false;

        info!("Alert raised: {} [{}] (count: {})", key, severity, state.fire_count);
    }

    /// Mark an alert key as acknowledged
    pub fn acknowledge(&mut self, key: &str) -> bool {
        match self.states.get_mut(key) {
            Some(state) => {
                state.acknowledged = true;
                info!("Alert acknowledged: {}", key);
                true
            }
            None => false,
        }
    }

    /// Unacknowledged alerts ordered by key
    pub fn pending(&self) -> Vec<(&str, &AlertState)> {
        self.states
            .iter()
            .filter(|(_, state)| !state.acknowledged)
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }

    /// Alerts raised in the current hour window
    pub fn hourly_count(&self) -> usize {
        self.window_count
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.window_start = None;
        self.window_count = 0;
    }

    fn in_window(&self, at: DateTime<Utc>) -> bool {
        self.window_start
            .map(|start| at >= start && at - start < Duration::hours(1))
            .unwrap_or(false)
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

/// Cooldown as a duration, saturating at the largest representable span
fn cooldown(seconds: u64) -> Duration {
    match i64::try_from(seconds).ok().and_then(Duration::try_seconds) {
        Some(duration) => duration,
        None => {
            warn!("Cooldown of {}s out of range, treating as unbounded", seconds);
            Duration::MAX
        }
    }
}
