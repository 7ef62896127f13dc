//! Goal CRUD operations and queries.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    rows::{id_at, parsed_at, scope_at, timestamp_at},
    scope_param,
};
use crate::{
    error::{DatabaseResultExt, EngineError, EntityKind, Result},
    models::{DiaryType, Goal, GoalStatus},
    scope::Scope,
};

const GOAL_COLUMNS: &str = "id, scope_key, title, description, status, created_at, updated_at";

const INSERT_GOAL_SQL: &str = "INSERT INTO goals (scope_key, title, description, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)";
const COUNT_OPEN_GOALS_SQL: &str =
    "SELECT COUNT(*) FROM goals WHERE scope_key = ?1 AND status IN ('active', 'paused')";
const SELECT_GOAL_SQL: &str = "SELECT id, scope_key, title, description, status, created_at, updated_at FROM goals WHERE id = ?1 AND (?2 IS NULL OR scope_key = ?2)";
const UPDATE_GOAL_STATUS_SQL: &str =
    "UPDATE goals SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4";
const TOUCH_GOAL_SQL: &str = "UPDATE goals SET updated_at = ?1 WHERE id = ?2";
const DELETE_GOAL_SCHEDULES_SQL: &str = "DELETE FROM schedules WHERE (target_type = 'goal' AND target_id = ?1) OR (target_type = 'task' AND target_id IN (SELECT id FROM tasks WHERE goal_id = ?1))";
const DELETE_GOAL_TASKS_SQL: &str = "DELETE FROM tasks WHERE goal_id = ?1";
const DELETE_GOAL_SQL: &str = "DELETE FROM goals WHERE id = ?1";
const SELECT_FINISHED_GOAL_IDS_SQL: &str = "SELECT id FROM goals WHERE (?1 IS NULL OR scope_key = ?1) AND status IN ('completed', 'cancelled') ORDER BY id";

/// Outcome of deleting a goal.
#[derive(Debug, Clone)]
pub struct GoalRemoval {
    pub goal: Goal,
    /// Schedules that targeted the goal or one of its tasks
    pub removed_schedules: usize,
}

impl super::Database {
    fn build_goal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
        Ok(Goal {
            id: id_at(row, 0)?,
            scope: scope_at(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: parsed_at(row, 4)?,
            created_at: timestamp_at(row, 5)?,
            updated_at: timestamp_at(row, 6)?,
            tasks: Vec::new(),
        })
    }

    /// Fetches a goal with its tasks, honouring the scope filter.
    pub(crate) fn fetch_goal(
        conn: &Connection,
        id: u64,
        scope: Option<&Scope>,
    ) -> Result<Option<Goal>> {
        let goal = conn
            .query_row(
                SELECT_GOAL_SQL,
                params![id as i64, scope_param(scope)],
                Self::build_goal_from_row,
            )
            .optional()
            .db_context("Failed to query goal")?;

        match goal {
            Some(mut goal) => {
                goal.tasks = Self::load_tasks(conn, goal.id)?;
                Ok(Some(goal))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn require_goal(conn: &Connection, id: u64, scope: Option<&Scope>) -> Result<Goal> {
        Self::fetch_goal(conn, id, scope)?.ok_or(EngineError::not_found(EntityKind::Goal, id))
    }

    pub(crate) fn touch_goal(conn: &Connection, id: u64, now: &str) -> Result<()> {
        conn.execute(TOUCH_GOAL_SQL, params![now, id as i64])
            .db_context("Failed to update goal timestamp")?;
        Ok(())
    }

    /// Creates a goal in `scope` unless the scope already holds `max_goals`
    /// open (Active or Paused) goals.
    pub fn create_goal(
        &mut self,
        scope: &Scope,
        title: &str,
        description: Option<&str>,
        max_goals: u32,
    ) -> Result<Goal> {
        let tx = self.write_transaction()?;
        let scope_key = scope.storage_key();

        let open: i64 = tx
            .query_row(COUNT_OPEN_GOALS_SQL, params![&scope_key], |row| row.get(0))
            .db_context("Failed to count goals")?;
        if open >= i64::from(max_goals) {
            return Err(EngineError::limit_exceeded("active goals", max_goals));
        }

        let now = Timestamp::now();
        tx.execute(
            INSERT_GOAL_SQL,
            params![
                &scope_key,
                title,
                description,
                GoalStatus::Active.as_str(),
                now.to_string()
            ],
        )
        .db_context("Failed to insert goal")?;
        let id = tx.last_insert_rowid() as u64;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Goal {
            id,
            scope: scope.clone(),
            title: title.to_string(),
            description: description.map(String::from),
            status: GoalStatus::Active,
            created_at: now,
            updated_at: now,
            tasks: Vec::new(),
        })
    }

    /// Retrieves a goal by its ID.
    pub fn get_goal(&self, id: u64, scope: Option<&Scope>) -> Result<Option<Goal>> {
        Self::fetch_goal(&self.connection, id, scope)
    }

    /// Lists goals oldest first, optionally narrowed to one status.
    pub fn list_goals(&self, scope: Option<&Scope>, status: Option<GoalStatus>) -> Result<Vec<Goal>> {
        let query = format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE (?1 IS NULL OR scope_key = ?1) AND (?2 IS NULL OR status = ?2) ORDER BY id"
        );
        let mut stmt = self
            .connection
            .prepare(&query)
            .db_context("Failed to prepare query")?;

        let goals = stmt
            .query_map(
                params![scope_param(scope), status.map(|s| s.as_str())],
                Self::build_goal_from_row,
            )
            .db_context("Failed to query goals")?
            .collect::<rusqlite::Result<Vec<Goal>>>()
            .db_context("Failed to parse goal rows")?;

        goals
            .into_iter()
            .map(|mut goal| {
                goal.tasks = Self::load_tasks(&self.connection, goal.id)?;
                Ok(goal)
            })
            .collect()
    }

    /// Moves a goal to `next` if its current status allows it.
    ///
    /// Completing a goal appends a Progress diary entry in the goal's scope.
    pub fn transition_goal(
        &mut self,
        id: u64,
        scope: Option<&Scope>,
        next: GoalStatus,
    ) -> Result<Goal> {
        let tx = self.write_transaction()?;
        let mut goal = Self::require_goal(&tx, id, scope)?;

        if !goal.status.can_transition_to(next) {
            return Err(EngineError::invalid_state(format!(
                "Goal #{id} is {}; it cannot become {}",
                goal.status.as_str(),
                next.as_str()
            )));
        }

        let now = Timestamp::now();
        let now_str = now.to_string();
        let updated = tx
            .execute(
                UPDATE_GOAL_STATUS_SQL,
                params![next.as_str(), &now_str, id as i64, goal.status.as_str()],
            )
            .db_context("Failed to update goal status")?;
        if updated == 0 {
            return Err(EngineError::conflict(format!(
                "Goal #{id} was changed concurrently"
            )));
        }

        if next == GoalStatus::Completed {
            Self::insert_diary(
                &tx,
                &goal.scope,
                DiaryType::Progress,
                &format!("Goal completed: {}", goal.title),
                Some(id),
                None,
                &now_str,
            )?;
        }

        tx.commit().db_context("Failed to commit transaction")?;

        goal.status = next;
        goal.updated_at = now;
        Ok(goal)
    }

    /// Deletes a goal, its tasks, and every schedule pointing at either.
    pub fn delete_goal(&mut self, id: u64, scope: Option<&Scope>) -> Result<GoalRemoval> {
        let tx = self.write_transaction()?;
        let goal = Self::require_goal(&tx, id, scope)?;

        let removed_schedules = Self::purge_goal(&tx, id)?;

        Self::insert_diary(
            &tx,
            &goal.scope,
            DiaryType::Decision,
            &format!("Deleted goal: {}", goal.title),
            None,
            None,
            &Timestamp::now().to_string(),
        )?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(GoalRemoval {
            goal,
            removed_schedules,
        })
    }

    /// Removes Completed and Cancelled goals along with their tasks and
    /// schedules. Returns the number of goals removed.
    pub fn clear_finished_goals(&mut self, scope: Option<&Scope>) -> Result<usize> {
        let tx = self.write_transaction()?;

        let ids: Vec<i64> = {
            let mut stmt = tx
                .prepare(SELECT_FINISHED_GOAL_IDS_SQL)
                .db_context("Failed to prepare query")?;
            let ids = stmt
                .query_map(params![scope_param(scope)], |row| row.get(0))
                .db_context("Failed to query finished goals")?
                .collect::<rusqlite::Result<Vec<i64>>>()
                .db_context("Failed to parse goal ids")?;
            ids
        };

        for id in &ids {
            Self::purge_goal(&tx, *id as u64)?;
        }

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(ids.len())
    }

    /// Deletes schedules, tasks and the goal row. Returns removed schedules.
    fn purge_goal(conn: &Connection, id: u64) -> Result<usize> {
        let removed_schedules = conn
            .execute(DELETE_GOAL_SCHEDULES_SQL, params![id as i64])
            .db_context("Failed to delete goal schedules")?;
        conn.execute(DELETE_GOAL_TASKS_SQL, params![id as i64])
            .db_context("Failed to delete goal tasks")?;
        conn.execute(DELETE_GOAL_SQL, params![id as i64])
            .db_context("Failed to delete goal")?;
        Ok(removed_schedules)
    }
}
