//! Keyword retrieval over knowledge-base records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trace_engine::DecisionTrace;
use tracing::debug;

/// Maximum number of records returned by a search
pub const MAX_RESULTS: usize = 5;

const QUERY_TERM_WEIGHT: u32 = 2;
const KEYWORD_TEXT_WEIGHT: u32 = 3;
const KEYWORD_METADATA_WEIGHT: u32 = 1;

/// A knowledge-base passage (manual section, failure note, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<KnowledgeRecord>),
    One(KnowledgeRecord),
}

impl KnowledgeRecord {
    /// Parse a knowledge document holding either one record or a list
    pub fn from_document(json: &str) -> serde_json::Result<Vec<KnowledgeRecord>> {
        Ok(match serde_json::from_str(json)? {
            OneOrMany::Many(records) => records,
            OneOrMany::One(record) => vec![record],
        })
    }

    /// String metadata field, if present
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Human-readable citation built from metadata
    ///
    /// `"<document> (Section <s>)"`, falling back to the failure type.
    pub fn citation(&self) -> Option<String> {
        let source = self
            .meta_str("document")
            .or_else(|| self.meta_str("failure_type"))?;
        let section = match self.metadata.get("section") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "?".to_string(),
        };
        Some(format!("{} (Section {})", source, section))
    }
}

/// Free-text query plus context keywords
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub query: String,
    pub keywords: Vec<String>,
}

impl RetrievalQuery {
    /// Query built from a finalized trace: decision and observed behavior,
    /// with the triggered rule names and the decision as keywords
    pub fn from_trace(trace: &DecisionTrace) -> Self {
        let mut keywords = trace.rules_triggered().to_vec();
        keywords.push(trace.decision().to_string());

        Self {
            query: format!("{} {}", trace.decision(), trace.observed_behavior()),
            keywords,
        }
    }
}

/// Lightweight retriever scoring records by keyword overlap
#[derive(Debug, Clone, Default)]
pub struct KeywordRetriever {
    records: Vec<KnowledgeRecord>,
}

impl KeywordRetriever {
    pub fn new(records: Vec<KnowledgeRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Relevance of one record to a query
    pub fn score(&self, record: &KnowledgeRecord, query: &RetrievalQuery) -> u32 {
        let text = record.text.to_lowercase();
        let metadata = Value::Object(record.metadata.clone()).to_string().to_lowercase();

        let term_score: u32 = query
            .query
            .to_lowercase()
            .split_whitespace()
            .filter(|term| text.contains(term))
            .map(|_| QUERY_TERM_WEIGHT)
            .sum();

        let keyword_score: u32 = query
            .keywords
            .iter()
            .map(|kw| kw.to_lowercase())
            .map(|kw| {
                let mut score = 0;
                if text.contains(&kw) {
                    score += KEYWORD_TEXT_WEIGHT;
                }
                if metadata.contains(&kw) {
                    score += KEYWORD_METADATA_WEIGHT;
                }
                score
            })
            .sum();

        term_score + keyword_score
    }

    /// Top records by score; ties keep knowledge-base order
    pub fn search(&self, query: &RetrievalQuery) -> Vec<&KnowledgeRecord> {
        let mut scored: Vec<(u32, &KnowledgeRecord)> = self
            .records
            .iter()
            .map(|record| (self.score(record, query), record))
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!("Retrieval matched {} of {} records", scored.len(), self.records.len());

        scored
            .into_iter()
            .take(MAX_RESULTS)
            .map(|(_, record)| record)
            .collect()
    }
}
