use chrono::Utc;
use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::WatchedVolume;

use super::{parse_ts, parse_ts_opt};

const VOLUME_COLUMNS: &str = "id, path, label, added_at, last_scan_at";

pub struct VolumeRepository;

impl VolumeRepository {
    /// Add a watched root. Re-adding an existing path only refreshes its
    /// label, keeping the original id and timestamps.
    pub async fn add(conn: &Connection, volume: &WatchedVolume) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO watched_volumes (id, path, label, added_at, last_scan_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(path) DO UPDATE SET label=excluded.label
            "#,
            params![
                volume.id.clone(),
                volume.path.clone(),
                volume.label.clone(),
                volume.added_at.to_rfc3339(),
                volume.last_scan_at.map(|ts| ts.to_rfc3339()),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn list(conn: &Connection) -> Result<Vec<WatchedVolume>> {
        let mut rows = conn
            .query(&format!("SELECT {VOLUME_COLUMNS} FROM watched_volumes"), ())
            .await?;
        let mut volumes = Vec::new();
        while let Some(row) = rows.next().await? {
            volumes.push(Self::from_row(&row)?);
        }
        Ok(volumes)
    }

    pub async fn get_by_path(conn: &Connection, path: &str) -> Result<Option<WatchedVolume>> {
        let mut rows = conn
            .query(
                &format!("SELECT {VOLUME_COLUMNS} FROM watched_volumes WHERE path=?1"),
                params![path],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn remove(conn: &Connection, path: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM watched_volumes WHERE path=?1",
            params![path],
        )
        .await?;
        Ok(())
    }

    pub async fn touch_scan_time(conn: &Connection, volume_id: &str) -> Result<()> {
        conn.execute(
            "UPDATE watched_volumes SET last_scan_at=?1 WHERE id=?2",
            params![Utc::now().to_rfc3339(), volume_id],
        )
        .await?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<WatchedVolume> {
        let added_at: String = row.get(3)?;
        let last_scan_at: Option<String> = row.get(4)?;
        Ok(WatchedVolume {
            id: row.get(0)?,
            path: row.get(1)?,
            label: row.get(2)?,
            added_at: parse_ts(&added_at),
            last_scan_at: parse_ts_opt(last_scan_at),
        })
    }
}
