use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobStatus;

/// Crash-recovery record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub progress_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineJob {
    pub fn new(id: String, job_type: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            progress_json: None,
            created_at: now,
            updated_at: now,
        }
    }
}
