//! Templated Maintenance Advice
//!
//! Turns a finalized decision trace into maintenance advice without a
//! language model: keyword retrieval over a static knowledge base followed by
//! per-feature action templates.

mod advice;
mod retrieval;

pub use advice::{AdviceError, Advisor, Recommendation, TemplateAdvisor};
pub use retrieval::{KeywordRetriever, KnowledgeRecord, RetrievalQuery, MAX_RESULTS};
