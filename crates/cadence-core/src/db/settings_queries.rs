//! Persisted engine switches.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};

use crate::error::{DatabaseResultExt, Result};

const AUTO_MODE_KEY: &str = "auto_mode";

const SELECT_SETTING_SQL: &str = "SELECT value FROM engine_settings WHERE key = ?1";
const UPSERT_SETTING_SQL: &str = "INSERT INTO engine_settings (key, value, updated_at) VALUES (?1, ?2, ?3) ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

impl super::Database {
    /// The stored auto-mode switch, or `None` if it was never toggled.
    pub fn auto_mode(&self) -> Result<Option<bool>> {
        let value: Option<String> = self
            .connection
            .query_row(SELECT_SETTING_SQL, params![AUTO_MODE_KEY], |row| row.get(0))
            .optional()
            .db_context("Failed to read auto mode")?;
        Ok(value.map(|v| v == "on"))
    }

    pub fn set_auto_mode(&mut self, enabled: bool) -> Result<()> {
        let value = if enabled { "on" } else { "off" };
        let tx = self.write_transaction()?;
        tx.execute(
            UPSERT_SETTING_SQL,
            params![AUTO_MODE_KEY, value, Timestamp::now().to_string()],
        )
        .db_context("Failed to store auto mode")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(())
    }
}
