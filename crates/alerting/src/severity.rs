//! Severity levels for trace confidence

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity bands: [0, 0.4) low, [0.4, 0.7) moderate, [0.7, 0.9) high, [0.9, 1] critical
const BANDS: [(f64, Severity); 4] = [
    (0.9, Severity::Critical),
    (0.7, Severity::High),
    (0.4, Severity::Moderate),
    (0.0, Severity::Low),
];

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Severity for a confidence score
    pub fn from_confidence(confidence: f64) -> Self {
        BANDS
            .iter()
            .find(|(threshold, _)| confidence >= *threshold)
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Low)
    }

    /// Confidence as a whole percentage
    pub fn as_percentage(confidence: f64) -> u8 {
        (confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
