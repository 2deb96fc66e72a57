use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token-bounded text slice of an atom, the unit of embedding and
/// annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub atom_id: String,
    pub asset_id: String,
    pub chunk_text: String,
    pub token_count: i64,
    pub chunk_index: i64,
    pub evidence_anchor: String,
    pub embedding_id: Option<String>,
    pub pipeline_version: String,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        atom_id: String,
        asset_id: String,
        chunk_text: String,
        token_count: i64,
        chunk_index: i64,
        evidence_anchor: String,
        pipeline_version: String,
    ) -> Self {
        Self {
            id,
            atom_id,
            asset_id,
            chunk_text,
            token_count,
            chunk_index,
            evidence_anchor,
            embedding_id: None,
            pipeline_version,
            created_at: Utc::now(),
        }
    }
}
