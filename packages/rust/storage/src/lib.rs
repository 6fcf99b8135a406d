//! libSQL-backed Source Store (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding work items, the
//! per-stage records each pipeline writes, and a minimal mirror of the
//! external order aggregate.
//!
//! **Access rules:**
//! - Pipelines: read-write via [`Storage::open`]; every stage writes its own records
//! - Reporting: read-only via [`Storage::open_readonly`]

mod academic;
mod content;
mod migrations;
mod orders;
mod rows;
mod stages;
mod work_items;

use std::path::Path;

use libsql::params::IntoParams;
use libsql::{Connection, Database, Row, params};
use papermill_shared::{PapermillError, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PapermillError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(PapermillError::storage)?;

        let conn = db.connect().map_err(PapermillError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(PapermillError::storage)?;

        let conn = db.connect().map_err(PapermillError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PapermillError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PapermillError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Run a query and convert every returned row.
    async fn query_all<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        convert: fn(&Row) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(PapermillError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(PapermillError::storage)? {
            results.push(convert(&row)?);
        }
        Ok(results)
    }

    /// Run a query expected to return at most one row.
    async fn query_one<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        convert: fn(&Row) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(PapermillError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(convert(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PapermillError::storage(e)),
        }
    }

    /// Execute a write and return the number of affected rows.
    async fn write(&self, sql: &str, params: impl IntoParams) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute(sql, params)
            .await
            .map_err(PapermillError::storage)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use papermill_shared::{NewWorkItem, WorkItem};
    use uuid::Uuid;

    use super::Storage;

    /// Create a temp file storage for testing.
    pub async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("pm_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// Insert a pending article work item.
    pub async fn seeded_item(storage: &Storage, content_type: &str) -> WorkItem {
        let item = NewWorkItem {
            topic: "Heat pumps in older buildings".into(),
            target_length: 4000,
            content_type: content_type.into(),
            language: "en".into(),
            ..Default::default()
        }
        .into_work_item()
        .expect("valid work item");
        storage.create_work_item(&item).await.expect("insert item");
        item
    }
}
