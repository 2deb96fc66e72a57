use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::Annotation;

use super::parse_ts;

const ANNOTATION_COLUMNS: &str = "id, chunk_id, model_id, prompt_id, prompt_version, \
     pipeline_version, topics_json, sentiment_label, sentiment_confidence, entities_json, \
     claims_json, summary, quality_flags_json, is_current, created_at";

pub struct AnnotationRepository;

impl AnnotationRepository {
    /// Insert a new annotation as current. Any previously current annotation
    /// for the same chunk is flipped to non-current in the same transaction,
    /// so readers never observe two current rows.
    pub async fn insert(conn: &Connection, ann: &Annotation) -> Result<()> {
        let tx = conn.transaction().await?;
        tx.execute(
            "UPDATE annotations SET is_current=0 WHERE chunk_id=?1 AND is_current=1",
            params![ann.chunk_id.clone()],
        )
        .await?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO annotations
            (id, chunk_id, model_id, prompt_id, prompt_version, pipeline_version,
             topics_json, sentiment_label, sentiment_confidence, entities_json,
             claims_json, summary, quality_flags_json, is_current, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                ann.id.clone(),
                ann.chunk_id.clone(),
                ann.model_id.clone(),
                ann.prompt_id.clone(),
                ann.prompt_version.clone(),
                ann.pipeline_version.clone(),
                ann.topics_json.clone(),
                ann.sentiment_label.clone(),
                ann.sentiment_confidence,
                ann.entities_json.clone(),
                ann.claims_json.clone(),
                ann.summary.clone(),
                ann.quality_flags_json.clone(),
                ann.is_current as i64,
                ann.created_at.to_rfc3339(),
            ],
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn current_for_chunk(
        conn: &Connection,
        chunk_id: &str,
    ) -> Result<Option<Annotation>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE chunk_id=?1 AND is_current=1"
                ),
                params![chunk_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn count_current(conn: &Connection) -> Result<i64> {
        let mut rows = conn
            .query("SELECT COUNT(*) FROM annotations WHERE is_current=1", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    fn from_row(row: &Row) -> Result<Annotation> {
        let is_current: i64 = row.get(13)?;
        let created_at: String = row.get(14)?;
        Ok(Annotation {
            id: row.get(0)?,
            chunk_id: row.get(1)?,
            model_id: row.get(2)?,
            prompt_id: row.get(3)?,
            prompt_version: row.get(4)?,
            pipeline_version: row.get(5)?,
            topics_json: row.get(6)?,
            sentiment_label: row.get(7)?,
            sentiment_confidence: row.get(8)?,
            entities_json: row.get(9)?,
            claims_json: row.get(10)?,
            summary: row.get(11)?,
            quality_flags_json: row.get(12)?,
            is_current: is_current != 0,
            created_at: parse_ts(&created_at),
        })
    }
}
