use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AssetStatus;

/// A tracked file under a watched root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAsset {
    pub id: String,
    pub path: String,
    pub filename: String,
    pub uti: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub mtime_ns: i64,
    pub content_hash: Option<String>,
    pub scan_version: i64,
    pub status: AssetStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileAsset {
    pub fn new(id: String, path: String, filename: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            path,
            filename,
            uti: None,
            mime_type: None,
            size_bytes: 0,
            mtime_ns: 0,
            content_hash: None,
            scan_version: 1,
            status: AssetStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
