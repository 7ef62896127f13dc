//! Task CRUD operations and queries.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    rows::{id_at, parsed_at, timestamp_at},
    scope_param,
};
use crate::{
    error::{DatabaseResultExt, EngineError, EntityKind, Result},
    models::{DiaryType, Task, TaskStatus},
    params::NewTask,
    scope::Scope,
};

const TASK_COLUMNS: &str =
    "t.id, t.goal_id, t.title, t.description, t.status, t.task_order, t.result, t.created_at, t.updated_at";

const SELECT_TASKS_BY_GOAL_SQL: &str = "SELECT t.id, t.goal_id, t.title, t.description, t.status, t.task_order, t.result, t.created_at, t.updated_at FROM tasks t WHERE t.goal_id = ?1 ORDER BY t.task_order";
const SELECT_TASK_SQL: &str = "SELECT t.id, t.goal_id, t.title, t.description, t.status, t.task_order, t.result, t.created_at, t.updated_at FROM tasks t JOIN goals g ON g.id = t.goal_id WHERE t.id = ?1 AND (?2 IS NULL OR g.scope_key = ?2)";
const SELECT_NEXT_ORDER_SQL: &str =
    "SELECT COALESCE(MAX(task_order), 0) + 1 FROM tasks WHERE goal_id = ?1";
const CHECK_ORDER_TAKEN_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM tasks WHERE goal_id = ?1 AND task_order = ?2)";
const INSERT_TASK_SQL: &str = "INSERT INTO tasks (goal_id, title, description, status, task_order, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)";
const UPDATE_TASK_STATUS_SQL: &str =
    "UPDATE tasks SET status = ?1, result = COALESCE(?2, result), updated_at = ?3 WHERE id = ?4";
const CLAIM_TASK_SQL: &str = "UPDATE tasks SET status = 'in_progress', updated_at = ?1 WHERE id = ?2 AND status NOT IN ('completed', 'skipped')";
const DELETE_TASK_SCHEDULES_SQL: &str =
    "DELETE FROM schedules WHERE target_type = 'task' AND target_id = ?1";
const DELETE_TASK_SQL: &str = "DELETE FROM tasks WHERE id = ?1";

impl super::Database {
    fn build_task_from_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        Ok(Task {
            id: id_at(row, 0)?,
            goal_id: id_at(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: parsed_at(row, 4)?,
            order: row.get::<_, i64>(5)? as u32,
            result: row.get(6)?,
            created_at: timestamp_at(row, 7)?,
            updated_at: timestamp_at(row, 8)?,
        })
    }

    pub(crate) fn load_tasks(conn: &Connection, goal_id: u64) -> Result<Vec<Task>> {
        let mut stmt = conn
            .prepare(SELECT_TASKS_BY_GOAL_SQL)
            .db_context("Failed to prepare query")?;
        let tasks = stmt
            .query_map(params![goal_id as i64], Self::build_task_from_row)
            .db_context("Failed to query tasks")?
            .collect::<rusqlite::Result<Vec<Task>>>()
            .db_context("Failed to parse task rows")?;
        Ok(tasks)
    }

    pub(crate) fn fetch_task(
        conn: &Connection,
        id: u64,
        scope: Option<&Scope>,
    ) -> Result<Option<Task>> {
        conn.query_row(
            SELECT_TASK_SQL,
            params![id as i64, scope_param(scope)],
            Self::build_task_from_row,
        )
        .optional()
        .db_context("Failed to query task")
    }

    pub(crate) fn require_task(conn: &Connection, id: u64, scope: Option<&Scope>) -> Result<Task> {
        Self::fetch_task(conn, id, scope)?.ok_or(EngineError::not_found(EntityKind::Task, id))
    }

    /// Appends tasks to a goal in one transaction.
    ///
    /// Tasks without an explicit order go after the current last task. An
    /// explicit order already used in the goal is a conflict. Terminal goals
    /// accept no new tasks, and a goal holds at most `max_tasks` tasks.
    pub fn add_tasks(
        &mut self,
        goal_id: u64,
        scope: Option<&Scope>,
        new_tasks: &[NewTask],
        max_tasks: u32,
    ) -> Result<Vec<Task>> {
        let tx = self.write_transaction()?;
        let goal = Self::require_goal(&tx, goal_id, scope)?;

        if goal.status.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "Goal #{goal_id} is {}; no tasks can be added",
                goal.status.as_str()
            )));
        }
        if goal.tasks.len() + new_tasks.len() > max_tasks as usize {
            return Err(EngineError::limit_exceeded("tasks per goal", max_tasks));
        }

        let now = Timestamp::now();
        let now_str = now.to_string();
        let mut created = Vec::with_capacity(new_tasks.len());

        for new_task in new_tasks {
            if new_task.title.trim().is_empty() {
                return Err(EngineError::invalid_argument("title").with_reason("must not be empty"));
            }

            let order = match new_task.order {
                Some(order) => {
                    let taken: bool = tx
                        .query_row(
                            CHECK_ORDER_TAKEN_SQL,
                            params![goal_id as i64, i64::from(order)],
                            |row| row.get(0),
                        )
                        .db_context("Failed to check task order")?;
                    if taken {
                        return Err(EngineError::conflict(format!(
                            "Goal #{goal_id} already has a task with order {order}"
                        )));
                    }
                    order
                }
                None => {
                    let next: i64 = tx
                        .query_row(SELECT_NEXT_ORDER_SQL, params![goal_id as i64], |row| {
                            row.get(0)
                        })
                        .db_context("Failed to get next task order")?;
                    next as u32
                }
            };

            tx.execute(
                INSERT_TASK_SQL,
                params![
                    goal_id as i64,
                    new_task.title.trim(),
                    new_task.description.as_deref(),
                    TaskStatus::Pending.as_str(),
                    i64::from(order),
                    &now_str
                ],
            )
            .db_context("Failed to insert task")?;

            created.push(Task {
                id: tx.last_insert_rowid() as u64,
                goal_id,
                title: new_task.title.trim().to_string(),
                description: new_task.description.clone(),
                status: TaskStatus::Pending,
                order,
                result: None,
                created_at: now,
                updated_at: now,
            });
        }

        Self::touch_goal(&tx, goal_id, &now_str)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(created)
    }

    /// Retrieves a task by its ID.
    pub fn get_task(&self, id: u64, scope: Option<&Scope>) -> Result<Option<Task>> {
        Self::fetch_task(&self.connection, id, scope)
    }

    /// Sets a task's status and, when given, its result text.
    ///
    /// When `goal_id` is given the task must belong to that goal. Moving a
    /// task to Completed appends a Progress diary entry.
    pub fn update_task_status(
        &mut self,
        goal_id: Option<u64>,
        task_id: u64,
        scope: Option<&Scope>,
        status: TaskStatus,
        result: Option<&str>,
    ) -> Result<Task> {
        let tx = self.write_transaction()?;
        let mut task = Self::require_task(&tx, task_id, scope)?;
        if goal_id.is_some_and(|id| id != task.goal_id) {
            return Err(EngineError::not_found(EntityKind::Task, task_id));
        }
        let goal = Self::require_goal(&tx, task.goal_id, None)?;

        let now = Timestamp::now();
        let now_str = now.to_string();
        tx.execute(
            UPDATE_TASK_STATUS_SQL,
            params![status.as_str(), result, &now_str, task_id as i64],
        )
        .db_context("Failed to update task status")?;

        if status == TaskStatus::Completed && task.status != TaskStatus::Completed {
            let content = match result {
                Some(result) => format!("Completed task: {}. Result: {result}", task.title),
                None => format!("Completed task: {}", task.title),
            };
            Self::insert_diary(
                &tx,
                &goal.scope,
                DiaryType::Progress,
                &content,
                Some(goal.id),
                Some(task_id),
                &now_str,
            )?;
        }

        Self::touch_goal(&tx, goal.id, &now_str)?;
        tx.commit().db_context("Failed to commit transaction")?;

        task.status = status;
        if let Some(result) = result {
            task.result = Some(result.to_string());
        }
        task.updated_at = now;
        Ok(task)
    }

    /// Atomically marks a task InProgress unless it is already Completed or
    /// Skipped. Returns `None` when the task is missing or not claimable.
    pub fn claim_task(&mut self, task_id: u64) -> Result<Option<Task>> {
        let tx = self.write_transaction()?;
        let now_str = Timestamp::now().to_string();

        let claimed = tx
            .execute(CLAIM_TASK_SQL, params![&now_str, task_id as i64])
            .db_context("Failed to claim task")?;
        if claimed == 0 {
            return Ok(None);
        }

        let task = Self::fetch_task(&tx, task_id, None)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(task)
    }

    /// Deletes a task and the schedules targeting it. Returns the removed
    /// task and the number of removed schedules.
    pub fn delete_task(&mut self, task_id: u64, scope: Option<&Scope>) -> Result<(Task, usize)> {
        let tx = self.write_transaction()?;
        let task = Self::require_task(&tx, task_id, scope)?;

        let removed_schedules = tx
            .execute(DELETE_TASK_SCHEDULES_SQL, params![task_id as i64])
            .db_context("Failed to delete task schedules")?;
        tx.execute(DELETE_TASK_SQL, params![task_id as i64])
            .db_context("Failed to delete task")?;
        Self::touch_goal(&tx, task.goal_id, &Timestamp::now().to_string())?;

        tx.commit().db_context("Failed to commit transaction")?;
        Ok((task, removed_schedules))
    }

    /// First Pending task by order among Active goals, oldest goal first.
    pub fn next_pending_task(
        &self,
        scope: Option<&Scope>,
        goal_id: Option<u64>,
    ) -> Result<Option<Task>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t JOIN goals g ON g.id = t.goal_id \
             WHERE g.status = 'active' AND t.status = 'pending' \
             AND (?1 IS NULL OR g.scope_key = ?1) AND (?2 IS NULL OR g.id = ?2) \
             ORDER BY g.id, t.task_order LIMIT 1"
        );
        self.connection
            .query_row(
                &query,
                params![scope_param(scope), goal_id.map(|id| id as i64)],
                Self::build_task_from_row,
            )
            .optional()
            .db_context("Failed to query next pending task")
    }
}
