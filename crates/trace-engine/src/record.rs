//! Feature records received from upstream feature extraction

use crate::error::EngineError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Monitored component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Component {
    Pump,
    Conveyor,
    Compressor,
}

impl Component {
    /// All supported components
    pub const ALL: [Component; 3] = [Component::Pump, Component::Conveyor, Component::Compressor];

    /// Wire tag for this component
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Pump => "PUMP",
            Component::Conveyor => "CONVEYOR",
            Component::Compressor => "COMPRESSOR",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = EngineError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Component::ALL
            .into_iter()
            .find(|c| c.as_str() == tag)
            .ok_or_else(|| EngineError::UnknownComponent(tag.to_string()))
    }
}

/// One feature record per input event
///
/// The component tag is kept as received so that an unsupported tag is
/// reported by the evaluator rather than rejected during parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// ISO-8601 instant of the event
    pub timestamp: String,
    /// Component tag (PUMP, CONVEYOR, COMPRESSOR)
    pub component: String,
    /// Preprocessed sensor features by name
    pub features: BTreeMap<String, f64>,
}

impl FeatureRecord {
    /// Create a record for a known component
    pub fn new(
        timestamp: impl Into<String>,
        component: Component,
        features: impl IntoIterator<Item = (String, f64)>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            component: component.as_str().to_string(),
            features: features.into_iter().collect(),
        }
    }

    /// Resolve the component tag
    pub fn component(&self) -> Result<Component, EngineError> {
        self.component.parse()
    }

    /// Look up a feature value
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    /// Parse the timestamp as a UTC instant
    ///
    /// Accepts RFC 3339 with an offset, or a naive date-time which is taken
    /// to be UTC.
    pub fn instant(&self) -> Result<DateTime<Utc>, EngineError> {
        parse_instant(&self.timestamp)
    }
}

pub(crate) fn parse_instant(value: &str) -> Result<DateTime<Utc>, EngineError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| EngineError::InvalidTimestamp {
            value: value.to_string(),
            reason: "expected an ISO-8601 date-time".to_string(),
        })
}
