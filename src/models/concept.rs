use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A labeled cluster of chunks. Level 0 is the top layer; refinement adds
/// children at level + 1 with `parent_id` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
    pub level: i64,
    pub label: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub exemplar_chunk_ids: Option<String>,
    pub pipeline_version: Option<String>,
    pub model_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
