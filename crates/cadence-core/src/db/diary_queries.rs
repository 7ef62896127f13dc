//! Diary append and recency queries.

use jiff::Timestamp;
use rusqlite::{params, Connection};

use super::{
    rows::{id_at, parsed_at, scope_at, timestamp_at},
    scope_param,
};
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    models::{DiaryEntry, DiaryType},
    scope::Scope,
};

const INSERT_DIARY_SQL: &str = "INSERT INTO diary_entries (scope_key, entry_type, content, goal_id, task_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const SELECT_RECENT_DIARY_SQL: &str = "SELECT id, scope_key, entry_type, content, goal_id, task_id, created_at FROM diary_entries WHERE (?1 IS NULL OR scope_key = ?1) ORDER BY id DESC LIMIT ?2";

impl super::Database {
    pub(crate) fn insert_diary(
        conn: &Connection,
        scope: &Scope,
        entry_type: DiaryType,
        content: &str,
        goal_id: Option<u64>,
        task_id: Option<u64>,
        now: &str,
    ) -> Result<u64> {
        conn.execute(
            INSERT_DIARY_SQL,
            params![
                scope.storage_key(),
                entry_type.as_str(),
                content,
                goal_id.map(|id| id as i64),
                task_id.map(|id| id as i64),
                now
            ],
        )
        .db_context("Failed to insert diary entry")?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Appends a diary entry.
    pub fn write_diary(
        &mut self,
        scope: &Scope,
        entry_type: DiaryType,
        content: &str,
        goal_id: Option<u64>,
        task_id: Option<u64>,
    ) -> Result<DiaryEntry> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::invalid_argument("content").with_reason("must not be empty"));
        }

        let now = Timestamp::now();
        let id = Self::insert_diary(
            &self.connection,
            scope,
            entry_type,
            content,
            goal_id,
            task_id,
            &now.to_string(),
        )?;

        Ok(DiaryEntry {
            id,
            scope: scope.clone(),
            entry_type,
            content: content.to_string(),
            goal_id,
            task_id,
            created_at: now,
        })
    }

    /// Returns the newest `count` entries in chronological order.
    pub fn recent_diary(&self, scope: Option<&Scope>, count: usize) -> Result<Vec<DiaryEntry>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_RECENT_DIARY_SQL)
            .db_context("Failed to prepare query")?;

        let mut entries = stmt
            .query_map(params![scope_param(scope), count as i64], |row| {
                Ok(DiaryEntry {
                    id: id_at(row, 0)?,
                    scope: scope_at(row, 1)?,
                    entry_type: parsed_at(row, 2)?,
                    content: row.get(3)?,
                    goal_id: row.get::<_, Option<i64>>(4)?.map(|id| id as u64),
                    task_id: row.get::<_, Option<i64>>(5)?.map(|id| id as u64),
                    created_at: timestamp_at(row, 6)?,
                })
            })
            .db_context("Failed to query diary")?
            .collect::<rusqlite::Result<Vec<DiaryEntry>>>()
            .db_context("Failed to parse diary rows")?;

        entries.reverse();
        Ok(entries)
    }
}
