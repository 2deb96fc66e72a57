use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::Chunk;

use super::parse_ts;

const CHUNK_COLUMNS: &str = "id, atom_id, asset_id, chunk_text, token_count, chunk_index, \
     evidence_anchor, embedding_id, pipeline_version, created_at";

const INSERT_CHUNK_SQL: &str = r#"
    INSERT OR REPLACE INTO chunks
    (id, atom_id, asset_id, chunk_text, token_count, chunk_index,
     evidence_anchor, embedding_id, pipeline_version, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

pub struct ChunkRepository;

impl ChunkRepository {
    pub async fn insert(conn: &Connection, chunk: &Chunk) -> Result<()> {
        conn.execute(INSERT_CHUNK_SQL, Self::insert_params(chunk))
            .await?;
        Ok(())
    }

    pub async fn insert_batch(conn: &Connection, chunks: &[Chunk]) -> Result<()> {
        let tx = conn.transaction().await?;
        for chunk in chunks {
            tx.execute(INSERT_CHUNK_SQL, Self::insert_params(chunk))
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(conn: &Connection, chunk_id: &str) -> Result<Option<Chunk>> {
        let mut rows = conn
            .query(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id=?1"),
                params![chunk_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_for_asset(conn: &Connection, asset_id: &str) -> Result<Vec<Chunk>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHUNK_COLUMNS} FROM chunks WHERE asset_id=?1 ORDER BY chunk_index"
                ),
                params![asset_id],
            )
            .await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(Self::from_row(&row)?);
        }
        Ok(chunks)
    }

    pub async fn list_without_embeddings(conn: &Connection, limit: i64) -> Result<Vec<Chunk>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHUNK_COLUMNS} FROM chunks WHERE embedding_id IS NULL LIMIT ?1"
                ),
                params![limit],
            )
            .await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(Self::from_row(&row)?);
        }
        Ok(chunks)
    }

    pub async fn update_embedding(
        conn: &Connection,
        chunk_id: &str,
        embedding_id: &str,
    ) -> Result<()> {
        conn.execute(
            "UPDATE chunks SET embedding_id=?1 WHERE id=?2",
            params![embedding_id, chunk_id],
        )
        .await?;
        Ok(())
    }

    pub async fn delete_for_asset(conn: &Connection, asset_id: &str) -> Result<()> {
        conn.execute("DELETE FROM chunks WHERE asset_id=?1", params![asset_id])
            .await?;
        Ok(())
    }

    pub async fn count(conn: &Connection) -> Result<i64> {
        let mut rows = conn.query("SELECT COUNT(*) FROM chunks", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    fn insert_params(chunk: &Chunk) -> impl libsql::params::IntoParams {
        params![
            chunk.id.clone(),
            chunk.atom_id.clone(),
            chunk.asset_id.clone(),
            chunk.chunk_text.clone(),
            chunk.token_count,
            chunk.chunk_index,
            chunk.evidence_anchor.clone(),
            chunk.embedding_id.clone(),
            chunk.pipeline_version.clone(),
            chunk.created_at.to_rfc3339(),
        ]
    }

    fn from_row(row: &Row) -> Result<Chunk> {
        let created_at: String = row.get(9)?;
        Ok(Chunk {
            id: row.get(0)?,
            atom_id: row.get(1)?,
            asset_id: row.get(2)?,
            chunk_text: row.get(3)?,
            token_count: row.get(4)?,
            chunk_index: row.get(5)?,
            evidence_anchor: row.get(6)?,
            embedding_id: row.get(7)?,
            pipeline_version: row.get(8)?,
            created_at: parse_ts(&created_at),
        })
    }
}
