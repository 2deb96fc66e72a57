use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Edge type strings fixed by the persisted schema and the external API.
pub mod edge_type {
    pub const CONCEPT_MEMBER: &str = "concept_member";
    pub const SIMILARITY: &str = "similarity";
}

/// A typed, weighted directed edge between two graph nodes (concepts or
/// chunks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: String,
    pub weight: f64,
    pub evidence_json: Option<String>,
    pub pipeline_version: Option<String>,
    pub created_at: DateTime<Utc>,
}
