//! Decision Trace Pipeline
//!
//! Batch driver around the rule engine: reads feature records, writes
//! decision traces and, for alerts that pass deduplication, templated
//! maintenance advice.

use alerting::AlertManager;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use fallback::{
    Advisor, KeywordRetriever, KnowledgeRecord, Recommendation, RetrievalQuery, TemplateAdvisor,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use trace_engine::{
    latest_rejection, DecisionTrace, FeatureRecord, InteractionLogEntry, RuleEngine, RuleSet,
    ThresholdAdjuster,
};

mod settings;

pub use settings::{Settings, CONFIG_ENV, DEFAULT_CONFIG_FILE, ENV_PREFIX};

pub const TRACES_FILE: &str = "traces.json";
pub const RECOMMENDATIONS_FILE: &str = "recommendations.json";
pub const ADJUSTED_RULES_FILE: &str = "adjusted_rules.json";
pub const ADJUSTMENTS_FILE: &str = "threshold_adjustments.json";

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Records turned into traces
    pub evaluated: usize,
    /// Records rejected as invalid input
    pub skipped: usize,
    /// Recommendations written
    pub recommendations: usize,
    /// Thresholds relaxed from operator feedback
    pub adjustments: usize,
    /// Entries appended to the interaction log
    pub logged: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Initialize logging
pub fn init_logging(level: &str, json: bool) {
    let level: Level = level.parse().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Rule table from the configured file, or the built-in table
pub async fn load_rules(settings: &Settings) -> Result<RuleSet> {
    match &settings.engine.rules_path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read rules {}", path.display()))?;
            let rules = RuleSet::from_json(&text)
                .with_context(|| format!("Invalid rule table {}", path.display()))?;
            info!("Loaded {} rules from {}", rules.rule_count(), path.display());
            Ok(rules)
        }
        None => Ok(RuleSet::default()),
    }
}

/// Feature records from a file holding one record or an array
pub async fn load_records(path: &Path) -> Result<Vec<FeatureRecord>> {
    let records = read_json::<OneOrMany<FeatureRecord>>(path).await?.into_vec();
    info!("Read {} feature records from {}", records.len(), path.display());
    Ok(records)
}

/// All knowledge-base records, in file order
pub async fn load_knowledge(paths: &[impl AsRef<Path>]) -> Result<Vec<KnowledgeRecord>> {
    let mut records = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read knowledge base {}", path.display()))?;
        let mut parsed = KnowledgeRecord::from_document(&text)
            .with_context(|| format!("Failed to parse knowledge base {}", path.display()))?;
        records.append(&mut parsed);
    }
    Ok(records)
}

/// Raw interaction log entries; a missing or non-list file reads as empty
async fn read_log_values(path: &Path) -> Result<Vec<Value>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    match serde_json::from_str(&text) {
        Ok(Value::Array(entries)) => Ok(entries),
        _ => {
            warn!("Interaction log {} is not a list, starting fresh", path.display());
            Ok(Vec::new())
        }
    }
}

/// Interaction log entries, skipping any that do not parse
pub async fn load_interactions(path: &Path) -> Result<Vec<InteractionLogEntry>> {
    let entries = read_log_values(path)
        .await?
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping interaction {} in {}: {}", index, path.display(), e);
                None
            }
        })
        .collect();
    Ok(entries)
}

/// Append one unreviewed entry per recommendation to the interaction log
///
/// Existing entries are kept as they are, including ones that do not parse.
pub async fn append_interactions(
    path: &Path,
    traces: &[DecisionTrace],
    advice: &[Recommendation],
) -> Result<usize> {
    let mut log = read_log_values(path).await?;
    let timestamp = Utc::now().to_rfc3339();
    let mut appended = 0;

    for recommendation in advice {
        let Some(trace) = traces.iter().find(|t| t.alert_id() == recommendation.alert_id) else {
            continue;
        };
        let entry = InteractionLogEntry::unreviewed(
            timestamp.clone(),
            trace.clone(),
            recommendation.explanation(),
        );
        log.push(serde_json::to_value(&entry)?);
        appended += 1;
    }

    write_json(path, &log).await?;
    info!("Logged {} interactions to {}", appended, path.display());
    Ok(appended)
}

/// Evaluate records concurrently on a shared engine
///
/// Results keep input order. Invalid records are logged and dropped; a
/// configuration error aborts the batch.
pub async fn evaluate_all(
    engine: Arc<RuleEngine>,
    records: Vec<FeatureRecord>,
) -> Result<(Vec<DecisionTrace>, usize)> {
    let mut tasks = JoinSet::new();
    let total = records.len();

    for (index, record) in records.into_iter().enumerate() {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move { (index, engine.evaluate(&record)) });
    }

    let mut slots: Vec<Option<DecisionTrace>> = vec![None; total];
    let mut skipped = 0;

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.context("Evaluation task failed")?;
        match result {
            Ok(trace) => slots[index] = Some(trace),
            Err(e) if e.is_configuration_error() => {
                tasks.abort_all();
                bail!("Rule configuration error: {}", e);
            }
            Err(e) => {
                warn!("Skipping record {}: {}", index, e);
                skipped += 1;
            }
        }
    }

    Ok((slots.into_iter().flatten().collect(), skipped))
}

/// Advice for every trace the alert manager lets through
pub fn recommend(
    traces: &[DecisionTrace],
    alerts: &mut AlertManager,
    retriever: &KeywordRetriever,
    advisor: &dyn Advisor,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for trace in traces {
        let at = match trace.instant() {
            Ok(at) => at,
            Err(e) => {
                warn!("Alert {} has no event time: {}", trace.alert_id(), e);
                continue;
            }
        };
        if !alerts.should_fire(trace, at) {
            continue;
        }
        alerts.record_fire(trace, at);

        let context = retriever.search(&RetrievalQuery::from_trace(trace));
        match advisor.advise(trace, &context) {
            Ok(advice) => out.push(advice),
            Err(e) => warn!("No advice for {}: {}", trace.alert_id(), e),
        }
    }
    out
}

/// Run the pipeline end to end
pub async fn run(settings: &Settings) -> Result<PipelineReport> {
    let mut rules = load_rules(settings).await?;
    let mut report = PipelineReport::default();

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.output_dir.display()))?;

    if let Some(log_path) = &settings.interaction_log {
        let log = load_interactions(log_path).await?;
        match latest_rejection(&log) {
            Some(entry) => {
                let adjuster = ThresholdAdjuster::new(settings.adjuster);
                let (adjusted, audit) = adjuster.adjust(&rules, &entry.input_trace, Utc::now())?;
                write_json(&settings.output_dir.join(ADJUSTED_RULES_FILE), &adjusted).await?;
                write_json(&settings.output_dir.join(ADJUSTMENTS_FILE), &audit).await?;
                report.adjustments = audit.len();
                rules = adjusted;
            }
            None => info!("No rejected alerts in {}", log_path.display()),
        }
    }

    let engine = Arc::new(RuleEngine::from_config(rules, &settings.engine)?);
    let records = load_records(&settings.input_path).await?;

    let (traces, skipped) = evaluate_all(engine, records).await?;
    report.evaluated = traces.len();
    report.skipped = skipped;
    write_json(&settings.output_dir.join(TRACES_FILE), &traces).await?;

    let retriever = KeywordRetriever::new(load_knowledge(&settings.knowledge_base).await?);
    info!("Knowledge base holds {} records", retriever.len());

    let mut alerts = AlertManager::new(settings.alerts.clone());
    let advice = recommend(&traces, &mut alerts, &retriever, &TemplateAdvisor::new());
    report.recommendations = advice.len();
    write_json(&settings.output_dir.join(RECOMMENDATIONS_FILE), &advice).await?;

    if let Some(log_path) = &settings.interaction_log {
        report.logged = append_interactions(log_path, &traces, &advice).await?;
    }

    Ok(report)
}
