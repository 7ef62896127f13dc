//! Database schema initialization and versioning.

use crate::error::{DatabaseResultExt, EngineError, Result};

/// Version written to `PRAGMA user_version` by this build.
pub const SCHEMA_VERSION: i64 = 2;

impl super::Database {
    /// Initializes the database schema using the embedded SQL file.
    pub(super) fn initialize_schema(&self) -> Result<()> {
        self.connection
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .db_context("Failed to enable WAL journal")?;

        self.connection
            .pragma_update(None, "foreign_keys", "ON")
            .db_context("Failed to enable foreign keys")?;

        let version: i64 = self
            .connection
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .db_context("Failed to read schema version")?;

        if version > SCHEMA_VERSION {
            return Err(EngineError::Configuration {
                message: format!(
                    "Database schema version {version} is newer than supported version {SCHEMA_VERSION}"
                ),
            });
        }

        if version == SCHEMA_VERSION {
            return Ok(());
        }

        // Every statement is idempotent, so older files are brought up to date
        // by replaying the whole schema.
        let schema_sql = include_str!("../../assets/schema.sql");
        self.connection
            .execute_batch(schema_sql)
            .db_context("Failed to initialize database schema")?;
        self.connection
            .pragma_update(None, "user_version", SCHEMA_VERSION)
            .db_context("Failed to record schema version")?;

        Ok(())
    }
}
