//! Schedule entry operations and queries.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    rows::{id_at, optional_timestamp_at, scope_at, timestamp_at},
    scope_param,
};
use crate::{
    cron::CronSchedule,
    error::{DatabaseResultExt, EngineError, EntityKind, Result},
    models::{ScheduleEntry, ScheduleTarget},
    scope::Scope,
};

const UNBOUNDED: i64 = -1;

const SCHEDULE_COLUMNS: &str = "id, scope_key, target_type, target_id, cron_expression, enabled, max_executions, execution_count, created_at, updated_at, last_executed_at, next_execution_at";

const INSERT_SCHEDULE_SQL: &str = "INSERT INTO schedules (scope_key, target_type, target_id, cron_expression, enabled, max_executions, execution_count, created_at, updated_at, next_execution_at) VALUES (?1, ?2, ?3, ?4, 1, ?5, 0, ?6, ?6, ?7)";
const SELECT_TASK_GOAL_SCOPE_SQL: &str = "SELECT g.scope_key FROM tasks t JOIN goals g ON g.id = t.goal_id WHERE t.id = ?1";
const SELECT_GOAL_SCOPE_SQL: &str = "SELECT scope_key FROM goals WHERE id = ?1";
const DELETE_SCHEDULE_SQL: &str = "DELETE FROM schedules WHERE id = ?1";
const RECORD_EXECUTION_SQL: &str = "UPDATE schedules SET execution_count = ?1, enabled = ?2, last_executed_at = ?3, next_execution_at = ?4, updated_at = ?3 WHERE id = ?5";

impl super::Database {
    fn build_schedule_from_row(row: &rusqlite::Row) -> rusqlite::Result<ScheduleEntry> {
        let target_type: String = row.get(2)?;
        let target = ScheduleTarget::from_parts(&target_type, id_at(row, 3)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?;
        let max_executions: i64 = row.get(6)?;

        Ok(ScheduleEntry {
            id: id_at(row, 0)?,
            scope: scope_at(row, 1)?,
            target,
            cron_expression: row.get(4)?,
            enabled: row.get(5)?,
            max_executions: (max_executions > 0).then_some(max_executions as u32),
            execution_count: row.get::<_, i64>(7)? as u32,
            created_at: timestamp_at(row, 8)?,
            updated_at: timestamp_at(row, 9)?,
            last_executed_at: optional_timestamp_at(row, 10)?,
            next_execution_at: optional_timestamp_at(row, 11)?,
        })
    }

    fn fetch_schedule(
        conn: &Connection,
        id: u64,
        scope: Option<&Scope>,
    ) -> Result<Option<ScheduleEntry>> {
        let query = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1 AND (?2 IS NULL OR scope_key = ?2)"
        );
        conn.query_row(
            &query,
            params![id as i64, scope_param(scope)],
            Self::build_schedule_from_row,
        )
        .optional()
        .db_context("Failed to query schedule")
    }

    fn query_schedules(
        &self,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<ScheduleEntry>> {
        let query = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE {filter} ORDER BY id");
        let mut stmt = self
            .connection
            .prepare(&query)
            .db_context("Failed to prepare query")?;
        let schedules = stmt
            .query_map(args, Self::build_schedule_from_row)
            .db_context("Failed to query schedules")?
            .collect::<rusqlite::Result<Vec<ScheduleEntry>>>()
            .db_context("Failed to parse schedule rows")?;
        Ok(schedules)
    }

    /// Scope key of the goal owning `target`, or `None` if it does not exist.
    fn target_scope(conn: &Connection, target: ScheduleTarget) -> Result<Option<String>> {
        let sql = match target {
            ScheduleTarget::Goal(_) => SELECT_GOAL_SCOPE_SQL,
            ScheduleTarget::Task(_) => SELECT_TASK_GOAL_SCOPE_SQL,
        };
        conn.query_row(sql, params![target.id() as i64], |row| row.get(0))
            .optional()
            .db_context("Failed to resolve schedule target")
    }

    /// Creates an enabled schedule with its first `next_execution_at`
    /// computed from `now`.
    ///
    /// The target must exist and, with a scope filter, belong to that scope.
    /// The entry takes the scope of the target's goal.
    pub fn create_schedule(
        &mut self,
        scope: Option<&Scope>,
        target: ScheduleTarget,
        cron: &CronSchedule,
        max_executions: Option<u32>,
        now: Timestamp,
    ) -> Result<ScheduleEntry> {
        if max_executions == Some(0) {
            return Err(EngineError::invalid_argument("max_executions")
                .with_reason("must be at least 1, or omitted for unbounded"));
        }

        let tx = self.write_transaction()?;
        let not_found = || match target {
            ScheduleTarget::Goal(id) => EngineError::not_found(EntityKind::Goal, id),
            ScheduleTarget::Task(id) => EngineError::not_found(EntityKind::Task, id),
        };

        let scope_key = Self::target_scope(&tx, target)?.ok_or_else(not_found)?;
        if scope.is_some_and(|s| s.storage_key() != scope_key) {
            return Err(not_found());
        }
        let owner = scope_key.parse::<Scope>()?;

        let next = cron.next_after(now);
        tx.execute(
            INSERT_SCHEDULE_SQL,
            params![
                &scope_key,
                target.kind(),
                target.id() as i64,
                cron.as_str(),
                max_executions.map_or(UNBOUNDED, i64::from),
                now.to_string(),
                next.map(|t| t.to_string())
            ],
        )
        .db_context("Failed to insert schedule")?;
        let id = tx.last_insert_rowid() as u64;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(ScheduleEntry {
            id,
            scope: owner,
            target,
            cron_expression: cron.as_str().to_string(),
            enabled: true,
            max_executions,
            execution_count: 0,
            created_at: now,
            updated_at: now,
            last_executed_at: None,
            next_execution_at: next,
        })
    }

    pub fn get_schedule(&self, id: u64, scope: Option<&Scope>) -> Result<Option<ScheduleEntry>> {
        Self::fetch_schedule(&self.connection, id, scope)
    }

    pub fn list_schedules(&self, scope: Option<&Scope>) -> Result<Vec<ScheduleEntry>> {
        self.query_schedules("(?1 IS NULL OR scope_key = ?1)", params![scope_param(scope)])
    }

    /// Schedules pointing at one goal or task.
    pub fn schedules_for_target(
        &self,
        target: ScheduleTarget,
        scope: Option<&Scope>,
    ) -> Result<Vec<ScheduleEntry>> {
        self.query_schedules(
            "target_type = ?1 AND target_id = ?2 AND (?3 IS NULL OR scope_key = ?3)",
            params![target.kind(), target.id() as i64, scope_param(scope)],
        )
    }

    /// Enabled entries across every scope, for the scheduler tick.
    pub fn enabled_schedules(&self) -> Result<Vec<ScheduleEntry>> {
        self.query_schedules("enabled = 1", [])
    }

    pub fn delete_schedule(&mut self, id: u64, scope: Option<&Scope>) -> Result<ScheduleEntry> {
        let tx = self.write_transaction()?;
        let entry = Self::fetch_schedule(&tx, id, scope)?
            .ok_or(EngineError::not_found(EntityKind::Schedule, id))?;

        tx.execute(DELETE_SCHEDULE_SQL, params![id as i64])
            .db_context("Failed to delete schedule")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(entry)
    }

    /// Records one firing at `now`.
    ///
    /// Increments the execution count. An entry that reaches its bound is
    /// disabled and loses its next execution time; otherwise the next time is
    /// recomputed from `now`, so missed occurrences are never replayed.
    /// Returns `None` if the entry was deleted in the meantime.
    pub fn record_schedule_execution(
        &mut self,
        id: u64,
        now: Timestamp,
    ) -> Result<Option<ScheduleEntry>> {
        let tx = self.write_transaction()?;
        let Some(mut entry) = Self::fetch_schedule(&tx, id, None)? else {
            return Ok(None);
        };

        entry.execution_count += 1;
        entry.last_executed_at = Some(now);
        entry.updated_at = now;

        if entry.is_exhausted() {
            entry.enabled = false;
            entry.next_execution_at = None;
        } else {
            let cron = CronSchedule::parse(&entry.cron_expression)?;
            entry.next_execution_at = cron.next_after(now);
        }

        tx.execute(
            RECORD_EXECUTION_SQL,
            params![
                i64::from(entry.execution_count),
                entry.enabled,
                now.to_string(),
                entry.next_execution_at.map(|t| t.to_string()),
                id as i64
            ],
        )
        .db_context("Failed to record schedule execution")?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Some(entry))
    }
}
