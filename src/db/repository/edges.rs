use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{edge_type, GraphEdge};

use super::parse_ts;

const EDGE_COLUMNS: &str =
    "id, source_id, target_id, edge_type, weight, evidence_json, pipeline_version, created_at";

/// Orderings the edge listing accepts. The column fragment is interpolated
/// into SQL, so only these fixed values are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrder {
    None,
    WeightDesc,
}

pub struct EdgeRepository;

impl EdgeRepository {
    pub async fn upsert(conn: &Connection, edge: &GraphEdge) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO graph_edges
            (id, source_id, target_id, edge_type, weight, evidence_json,
             pipeline_version, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                edge.id.clone(),
                edge.source_id.clone(),
                edge.target_id.clone(),
                edge.edge_type.clone(),
                edge.weight,
                edge.evidence_json.clone(),
                edge.pipeline_version.clone(),
                edge.created_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn list(conn: &Connection, order: EdgeOrder, limit: i64) -> Result<Vec<GraphEdge>> {
        let mut sql = format!("SELECT {EDGE_COLUMNS} FROM graph_edges");
        if order == EdgeOrder::WeightDesc {
            sql.push_str(" ORDER BY weight DESC");
        }
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut rows = conn.query(&sql, ()).await?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next().await? {
            edges.push(Self::from_row(&row)?);
        }
        Ok(edges)
    }

    pub async fn list_for_node(
        conn: &Connection,
        node_id: &str,
        limit: i64,
    ) -> Result<Vec<GraphEdge>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM graph_edges \
                     WHERE source_id=?1 OR target_id=?1 ORDER BY weight DESC LIMIT ?2"
                ),
                params![node_id, limit],
            )
            .await?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next().await? {
            edges.push(Self::from_row(&row)?);
        }
        Ok(edges)
    }

    /// Chunk IDs reachable from a concept through its membership edges.
    pub async fn member_chunk_ids(conn: &Connection, concept_id: &str) -> Result<Vec<String>> {
        let mut rows = conn
            .query(
                "SELECT target_id FROM graph_edges WHERE source_id=?1 AND edge_type=?2",
                params![concept_id, edge_type::CONCEPT_MEMBER],
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    pub async fn count(conn: &Connection) -> Result<i64> {
        let mut rows = conn.query("SELECT COUNT(*) FROM graph_edges", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    pub async fn count_by_type(conn: &Connection, edge_type: &str) -> Result<i64> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM graph_edges WHERE edge_type=?1",
                params![edge_type],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    fn from_row(row: &Row) -> Result<GraphEdge> {
        let created_at: String = row.get(7)?;
        Ok(GraphEdge {
            id: row.get(0)?,
            source_id: row.get(1)?,
            target_id: row.get(2)?,
            edge_type: row.get(3)?,
            weight: row.get(4)?,
            evidence_json: row.get(5)?,
            pipeline_version: row.get(6)?,
            created_at: parse_ts(&created_at),
        })
    }
}
