use std::collections::HashMap;

use chrono::Utc;
use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{AssetStatus, FileAsset};

use super::parse_ts;

const ASSET_COLUMNS: &str = "id, path, filename, uti, mime_type, size_bytes, mtime_ns, \
     content_hash, scan_version, status, error_message, created_at, updated_at";

pub struct AssetRepository;

impl AssetRepository {
    pub async fn upsert(conn: &Connection, asset: &FileAsset) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO file_assets (id, path, filename, uti, mime_type, size_bytes, mtime_ns,
                content_hash, scan_version, status, error_message, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                path=excluded.path, filename=excluded.filename, uti=excluded.uti,
                mime_type=excluded.mime_type, size_bytes=excluded.size_bytes,
                mtime_ns=excluded.mtime_ns, content_hash=excluded.content_hash,
                scan_version=excluded.scan_version, status=excluded.status,
                error_message=excluded.error_message, updated_at=excluded.updated_at
            "#,
            params![
                asset.id.clone(),
                asset.path.clone(),
                asset.filename.clone(),
                asset.uti.clone(),
                asset.mime_type.clone(),
                asset.size_bytes,
                asset.mtime_ns,
                asset.content_hash.clone(),
                asset.scan_version,
                asset.status.as_str(),
                asset.error_message.clone(),
                asset.created_at.to_rfc3339(),
                now,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get(conn: &Connection, asset_id: &str) -> Result<Option<FileAsset>> {
        let mut rows = conn
            .query(
                &format!("SELECT {ASSET_COLUMNS} FROM file_assets WHERE id=?1"),
                params![asset_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_path(conn: &Connection, path: &str) -> Result<Option<FileAsset>> {
        let mut rows = conn
            .query(
                &format!("SELECT {ASSET_COLUMNS} FROM file_assets WHERE path=?1"),
                params![path],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_status(
        conn: &Connection,
        status: AssetStatus,
        limit: i64,
    ) -> Result<Vec<FileAsset>> {
        let mut rows = conn
            .query(
                &format!("SELECT {ASSET_COLUMNS} FROM file_assets WHERE status=?1 LIMIT ?2"),
                params![status.as_str(), limit],
            )
            .await?;
        let mut assets = Vec::new();
        while let Some(row) = rows.next().await? {
            assets.push(Self::from_row(&row)?);
        }
        Ok(assets)
    }

    pub async fn list_all(conn: &Connection) -> Result<Vec<FileAsset>> {
        let mut rows = conn
            .query(&format!("SELECT {ASSET_COLUMNS} FROM file_assets"), ())
            .await?;
        let mut assets = Vec::new();
        while let Some(row) = rows.next().await? {
            assets.push(Self::from_row(&row)?);
        }
        Ok(assets)
    }

    pub async fn update_status(
        conn: &Connection,
        asset_id: &str,
        status: AssetStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE file_assets SET status=?1, error_message=?2, updated_at=?3 WHERE id=?4",
            params![
                status.as_str(),
                error_message,
                Utc::now().to_rfc3339(),
                asset_id
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn count_by_status(conn: &Connection) -> Result<HashMap<String, i64>> {
        let mut rows = conn
            .query(
                "SELECT status, COUNT(*) FROM file_assets GROUP BY status",
                (),
            )
            .await?;
        let mut counts = HashMap::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    fn from_row(row: &Row) -> Result<FileAsset> {
        let status: String = row.get(9)?;
        let created_at: String = row.get(11)?;
        let updated_at: String = row.get(12)?;
        Ok(FileAsset {
            id: row.get(0)?,
            path: row.get(1)?,
            filename: row.get(2)?,
            uti: row.get(3)?,
            mime_type: row.get(4)?,
            size_bytes: row.get(5)?,
            mtime_ns: row.get(6)?,
            content_hash: row.get(7)?,
            scan_version: row.get(8)?,
            status: status.parse().unwrap_or_default(),
            error_message: row.get(10)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }
}
