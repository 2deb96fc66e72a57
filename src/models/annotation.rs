use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A versioned LLM analysis of a chunk. At most one annotation per chunk is
/// current; superseded rows are kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub chunk_id: String,
    pub model_id: String,
    pub prompt_id: String,
    pub prompt_version: String,
    pub pipeline_version: String,
    pub topics_json: Option<String>,
    pub sentiment_label: Option<String>,
    pub sentiment_confidence: Option<f64>,
    pub entities_json: Option<String>,
    pub claims_json: Option<String>,
    pub summary: Option<String>,
    pub quality_flags_json: Option<String>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}
