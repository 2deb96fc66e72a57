use chrono::Utc;
use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{JobStatus, PipelineJob};

use super::parse_ts;

const JOB_COLUMNS: &str = "id, job_type, status, progress_json, created_at, updated_at";

pub struct JobRepository;

impl JobRepository {
    pub async fn upsert(conn: &Connection, job: &PipelineJob) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO pipeline_jobs (id, job_type, status, progress_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                status=excluded.status, progress_json=excluded.progress_json,
                updated_at=excluded.updated_at
            "#,
            params![
                job.id.clone(),
                job.job_type.clone(),
                job.status.as_str(),
                job.progress_json.clone(),
                job.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn latest(conn: &Connection, job_type: Option<&str>) -> Result<Option<PipelineJob>> {
        let mut rows = match job_type {
            Some(job_type) => {
                conn.query(
                    &format!(
                        "SELECT {JOB_COLUMNS} FROM pipeline_jobs WHERE job_type=?1 \
                         ORDER BY created_at DESC LIMIT 1"
                    ),
                    params![job_type],
                )
                .await?
            }
            None => {
                conn.query(
                    &format!(
                        "SELECT {JOB_COLUMNS} FROM pipeline_jobs ORDER BY created_at DESC LIMIT 1"
                    ),
                    (),
                )
                .await?
            }
        };
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn update_status(
        conn: &Connection,
        job_id: &str,
        status: JobStatus,
        progress_json: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE pipeline_jobs SET status=?1, progress_json=?2, updated_at=?3 WHERE id=?4",
            params![
                status.as_str(),
                progress_json,
                Utc::now().to_rfc3339(),
                job_id
            ],
        )
        .await?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<PipelineJob> {
        let status: String = row.get(2)?;
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;
        Ok(PipelineJob {
            id: row.get(0)?,
            job_type: row.get(1)?,
            status: status.parse().unwrap_or_default(),
            progress_json: row.get(3)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }
}
