use libsql::{Builder, Connection};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

use super::schema;

/// Handle to the workspace's single SQLite file. Cheap to clone; every
/// component opens short-lived connections through it.
pub struct Database {
    db: Arc<libsql::Database>,
}

impl Database {
    pub async fn new(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let database = Self { db: Arc::new(db) };
        database.init().await?;
        Ok(database)
    }

    pub async fn new_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let database = Self { db: Arc::new(db) };
        database.init().await?;
        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    async fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        // journal_mode returns a result row, so run pragmas through query.
        for pragma in [
            "PRAGMA journal_mode=WAL",
            "PRAGMA foreign_keys=ON",
            "PRAGMA busy_timeout=10000",
        ] {
            let mut rows = conn.query(pragma, ()).await?;
            while rows.next().await?.is_some() {}
        }
        schema::init_schema(&conn).await?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}
