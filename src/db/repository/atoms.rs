use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::ContentAtom;

use super::parse_ts;

const ATOM_COLUMNS: &str = "id, asset_id, atom_type, sequence_index, payload_text, payload_ref, \
     metadata_json, evidence_anchor, created_at";

const INSERT_ATOM_SQL: &str = r#"
    INSERT OR REPLACE INTO content_atoms
    (id, asset_id, atom_type, sequence_index, payload_text, payload_ref,
     metadata_json, evidence_anchor, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#;

pub struct AtomRepository;

impl AtomRepository {
    pub async fn insert(conn: &Connection, atom: &ContentAtom) -> Result<()> {
        conn.execute(INSERT_ATOM_SQL, Self::insert_params(atom))
            .await?;
        Ok(())
    }

    pub async fn insert_batch(conn: &Connection, atoms: &[ContentAtom]) -> Result<()> {
        let tx = conn.transaction().await?;
        for atom in atoms {
            tx.execute(INSERT_ATOM_SQL, Self::insert_params(atom)).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_for_asset(conn: &Connection, asset_id: &str) -> Result<Vec<ContentAtom>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ATOM_COLUMNS} FROM content_atoms WHERE asset_id=?1 ORDER BY sequence_index"
                ),
                params![asset_id],
            )
            .await?;
        let mut atoms = Vec::new();
        while let Some(row) = rows.next().await? {
            atoms.push(Self::from_row(&row)?);
        }
        Ok(atoms)
    }

    pub async fn delete_for_asset(conn: &Connection, asset_id: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM content_atoms WHERE asset_id=?1",
            params![asset_id],
        )
        .await?;
        Ok(())
    }

    fn insert_params(atom: &ContentAtom) -> impl libsql::params::IntoParams {
        params![
            atom.id.clone(),
            atom.asset_id.clone(),
            atom.atom_type.as_str(),
            atom.sequence_index,
            atom.payload_text.clone(),
            atom.payload_ref.clone(),
            atom.metadata_json.clone(),
            atom.evidence_anchor.clone(),
            atom.created_at.to_rfc3339(),
        ]
    }

    fn from_row(row: &Row) -> Result<ContentAtom> {
        let atom_type: String = row.get(2)?;
        let created_at: String = row.get(8)?;
        Ok(ContentAtom {
            id: row.get(0)?,
            asset_id: row.get(1)?,
            atom_type: atom_type.parse().unwrap_or_default(),
            sequence_index: row.get(3)?,
            payload_text: row.get(4)?,
            payload_ref: row.get(5)?,
            metadata_json: row.get(6)?,
            evidence_anchor: row.get(7)?,
            created_at: parse_ts(&created_at),
        })
    }
}
