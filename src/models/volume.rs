use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-declared source directory scanned for assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedVolume {
    pub id: String,
    pub path: String,
    pub label: Option<String>,
    pub added_at: DateTime<Utc>,
    pub last_scan_at: Option<DateTime<Utc>>,
}

impl WatchedVolume {
    pub fn new(id: String, path: String, label: Option<String>) -> Self {
        Self {
            id,
            path,
            label,
            added_at: Utc::now(),
            last_scan_at: None,
        }
    }
}
