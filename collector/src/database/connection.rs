//! Database connection management

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

use crate::database::schema::SCHEMA;
use crate::error::Result;

pub struct Database {
    pool: sqlx::SqlitePool,
}

impl Database {
    pub async fn new(database_path: &Path) -> Result<Self> {
        // Ensure the database directory exists
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        // Single writer process; a handful of connections is plenty.
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    /// Create every table and index. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Open `database_path` and make sure the schema exists.
    pub async fn open(database_path: &Path) -> Result<Self> {
        let db = Self::new(database_path).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
