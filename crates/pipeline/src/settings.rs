//! Pipeline settings

use alerting::AlertConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use trace_engine::{AdjusterConfig, EngineConfig};

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV: &str = "TRACE_PIPELINE_CONFIG";

/// Settings file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "trace-pipeline.toml";

/// Prefix for environment overrides, e.g. `TRACE_PIPELINE__ENGINE__DANGER_THRESHOLD`
pub const ENV_PREFIX: &str = "TRACE_PIPELINE";

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// JSON file holding one feature record or an array of them
    pub input_path: PathBuf,
    /// Directory receiving traces.json and recommendations.json
    pub output_dir: PathBuf,
    /// Knowledge-base documents used for retrieval
    pub knowledge_base: Vec<PathBuf>,
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
    pub engine: EngineConfig,
    pub alerts: AlertConfig,
    /// Operator interaction log: the latest rejection relaxes the rule table,
    /// and each recommendation is appended for review
    pub interaction_log: Option<PathBuf>,
    pub adjuster: AdjusterConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("extracted_features.json"),
            output_dir: PathBuf::from("output"),
            knowledge_base: Vec::new(),
            log_level: "info".to_string(),
            json_logs: false,
            engine: EngineConfig::default(),
            alerts: AlertConfig::default(),
            interaction_log: None,
            adjuster: AdjusterConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then the settings file, then environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("knowledge_base")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
