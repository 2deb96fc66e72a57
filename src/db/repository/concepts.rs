use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::ConceptNode;

use super::parse_ts;

const CONCEPT_COLUMNS: &str = "id, level, label, description, parent_id, exemplar_chunk_ids, \
     pipeline_version, model_id, created_at";

pub struct ConceptRepository;

impl ConceptRepository {
    pub async fn upsert(conn: &Connection, node: &ConceptNode) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO concept_nodes
            (id, level, label, description, parent_id, exemplar_chunk_ids,
             pipeline_version, model_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                node.id.clone(),
                node.level,
                node.label.clone(),
                node.description.clone(),
                node.parent_id.clone(),
                node.exemplar_chunk_ids.clone(),
                node.pipeline_version.clone(),
                node.model_id.clone(),
                node.created_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn list(conn: &Connection, level: Option<i64>) -> Result<Vec<ConceptNode>> {
        let mut rows = match level {
            Some(level) => {
                conn.query(
                    &format!("SELECT {CONCEPT_COLUMNS} FROM concept_nodes WHERE level=?1"),
                    params![level],
                )
                .await?
            }
            None => {
                conn.query(&format!("SELECT {CONCEPT_COLUMNS} FROM concept_nodes"), ())
                    .await?
            }
        };
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(Self::from_row(&row)?);
        }
        Ok(nodes)
    }

    pub async fn get(conn: &Connection, concept_id: &str) -> Result<Option<ConceptNode>> {
        let mut rows = conn
            .query(
                &format!("SELECT {CONCEPT_COLUMNS} FROM concept_nodes WHERE id=?1"),
                params![concept_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn count(conn: &Connection) -> Result<i64> {
        let mut rows = conn.query("SELECT COUNT(*) FROM concept_nodes", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    fn from_row(row: &Row) -> Result<ConceptNode> {
        let created_at: String = row.get(8)?;
        Ok(ConceptNode {
            id: row.get(0)?,
            level: row.get(1)?,
            label: row.get(2)?,
            description: row.get(3)?,
            parent_id: row.get(4)?,
            exemplar_chunk_ids: row.get(5)?,
            pipeline_version: row.get(6)?,
            model_id: row.get(7)?,
            created_at: parse_ts(&created_at),
        })
    }
}
