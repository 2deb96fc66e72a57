use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AtomType;

/// A single extracted content fragment belonging to an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAtom {
    pub id: String,
    pub asset_id: String,
    pub atom_type: AtomType,
    pub sequence_index: i64,
    pub payload_text: Option<String>,
    pub payload_ref: Option<String>,
    pub metadata_json: Option<String>,
    pub evidence_anchor: String,
    pub created_at: DateTime<Utc>,
}

impl ContentAtom {
    pub fn new(
        id: String,
        asset_id: String,
        atom_type: AtomType,
        sequence_index: i64,
        evidence_anchor: String,
    ) -> Self {
        Self {
            id,
            asset_id,
            atom_type,
            sequence_index,
            payload_text: None,
            payload_ref: None,
            metadata_json: None,
            evidence_anchor,
            created_at: Utc::now(),
        }
    }
}
