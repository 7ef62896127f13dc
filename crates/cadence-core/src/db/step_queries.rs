//! Plan step operations and queries.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use super::rows::{id_at, optional_timestamp_at, parsed_at};
use crate::{
    error::{DatabaseResultExt, EngineError, EntityKind, Result},
    models::{PlanStatus, PlanStep, StepStatus},
    scope::Scope,
};

const SELECT_STEPS_BY_PLAN_SQL: &str = "SELECT id, plan_id, tool_name, description, arguments, step_order, status, result, executed_at FROM plan_steps WHERE plan_id = ?1 ORDER BY step_order";
const SELECT_STEP_BY_ID_SQL: &str = "SELECT id, plan_id, tool_name, description, arguments, step_order, status, result, executed_at FROM plan_steps WHERE id = ?1";
const SELECT_DRAFT_PLAN_SQL: &str =
    "SELECT id FROM plans WHERE scope_key = ?1 AND status = 'collecting'";
const COUNT_STEPS_SQL: &str = "SELECT COUNT(*) FROM plan_steps WHERE plan_id = ?1";
const GET_NEXT_STEP_ORDER_SQL: &str =
    "SELECT COALESCE(MAX(step_order), -1) + 1 FROM plan_steps WHERE plan_id = ?1";
const INSERT_STEP_SQL: &str = "INSERT INTO plan_steps (plan_id, tool_name, description, arguments, step_order, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)";
const UPDATE_PLAN_TIMESTAMP_SQL: &str = "UPDATE plans SET updated_at = ?1 WHERE id = ?2";
const CLAIM_STEP_SQL: &str = "UPDATE plan_steps SET status = 'in_progress', updated_at = ?1 WHERE id = ?2 AND status IN ('pending', 'failed')";
const RECORD_STEP_SQL: &str = "UPDATE plan_steps SET status = ?1, result = ?2, executed_at = ?3, updated_at = ?4 WHERE id = ?5 AND status = 'in_progress'";
const SKIP_STEP_SQL: &str = "UPDATE plan_steps SET status = 'skipped', updated_at = ?1 WHERE id = ?2 AND status IN ('pending', 'failed')";

impl super::Database {
    fn build_step_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlanStep> {
        let arguments: String = row.get(4)?;
        let arguments = serde_json::from_str(&arguments).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(PlanStep {
            id: id_at(row, 0)?,
            plan_id: id_at(row, 1)?,
            tool_name: row.get(2)?,
            description: row.get(3)?,
            arguments,
            order: row.get::<_, i64>(5)? as u32,
            status: parsed_at(row, 6)?,
            result: row.get(7)?,
            executed_at: optional_timestamp_at(row, 8)?,
        })
    }

    pub(crate) fn load_steps(conn: &Connection, plan_id: u64) -> Result<Vec<PlanStep>> {
        let mut stmt = conn
            .prepare(SELECT_STEPS_BY_PLAN_SQL)
            .db_context("Failed to prepare query")?;
        let steps = stmt
            .query_map(params![plan_id as i64], Self::build_step_from_row)
            .db_context("Failed to query steps")?
            .collect::<rusqlite::Result<Vec<PlanStep>>>()
            .db_context("Failed to parse step rows")?;
        Ok(steps)
    }

    fn fetch_step(conn: &Connection, step_id: u64) -> Result<Option<PlanStep>> {
        conn.query_row(
            SELECT_STEP_BY_ID_SQL,
            params![step_id as i64],
            Self::build_step_from_row,
        )
        .optional()
        .db_context("Failed to query step")
    }

    /// Appends a step to the scope's Collecting plan.
    pub fn add_step(
        &mut self,
        scope: &Scope,
        tool_name: &str,
        description: &str,
        arguments: &serde_json::Value,
        max_steps: u32,
    ) -> Result<PlanStep> {
        let tool_name = tool_name.trim();
        if tool_name.is_empty() {
            return Err(EngineError::invalid_argument("tool_name").with_reason("must not be empty"));
        }

        let tx = self.write_transaction()?;

        let plan_id: i64 = tx
            .query_row(SELECT_DRAFT_PLAN_SQL, params![scope.storage_key()], |row| {
                row.get(0)
            })
            .optional()
            .db_context("Failed to query draft plan")?
            .ok_or_else(|| {
                EngineError::invalid_state("Plan mode is not active; start one with `plan on`")
            })?;

        let count: i64 = tx
            .query_row(COUNT_STEPS_SQL, params![plan_id], |row| row.get(0))
            .db_context("Failed to count steps")?;
        if count >= i64::from(max_steps) {
            return Err(EngineError::limit_exceeded("steps per plan", max_steps));
        }

        let order: i64 = tx
            .query_row(GET_NEXT_STEP_ORDER_SQL, params![plan_id], |row| row.get(0))
            .db_context("Failed to get next step order")?;

        let now_str = Timestamp::now().to_string();
        let description = if description.trim().is_empty() {
            tool_name.to_string()
        } else {
            description.trim().to_string()
        };

        tx.execute(
            INSERT_STEP_SQL,
            params![
                plan_id,
                tool_name,
                &description,
                serde_json::to_string(arguments)?,
                order,
                StepStatus::Pending.as_str(),
                &now_str
            ],
        )
        .db_context("Failed to insert step")?;
        let id = tx.last_insert_rowid() as u64;

        tx.execute(UPDATE_PLAN_TIMESTAMP_SQL, params![&now_str, plan_id])
            .db_context("Failed to update plan timestamp")?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(PlanStep {
            id,
            plan_id: plan_id as u64,
            tool_name: tool_name.to_string(),
            description,
            arguments: arguments.clone(),
            order: order as u32,
            status: StepStatus::Pending,
            result: None,
            executed_at: None,
        })
    }

    /// Atomically moves a Pending or Failed step to InProgress.
    ///
    /// Returns `None` if the step does not exist or is not runnable.
    pub fn claim_step(&mut self, step_id: u64) -> Result<Option<PlanStep>> {
        let tx = self.write_transaction()?;
        let now_str = Timestamp::now().to_string();

        let claimed = tx
            .execute(CLAIM_STEP_SQL, params![&now_str, step_id as i64])
            .db_context("Failed to claim step")?;
        if claimed == 0 {
            return Ok(None);
        }

        let step = Self::fetch_step(&tx, step_id)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(step)
    }

    /// Records the outcome of an InProgress step.
    ///
    /// Returning a step to Pending clears its result and execution time.
    pub fn record_step_result(
        &mut self,
        step_id: u64,
        status: StepStatus,
        result: Option<&str>,
    ) -> Result<()> {
        let tx = self.write_transaction()?;
        let now = Timestamp::now().to_string();
        let executed_at = (status != StepStatus::Pending).then_some(now.as_str());

        let updated = tx
            .execute(
                RECORD_STEP_SQL,
                params![status.as_str(), result, executed_at, &now, step_id as i64],
            )
            .db_context("Failed to record step result")?;
        if updated == 0 {
            return Err(EngineError::invalid_state(format!(
                "Step #{step_id} is not running"
            )));
        }

        tx.execute(
            "UPDATE plans SET updated_at = ?1 WHERE id = (SELECT plan_id FROM plan_steps WHERE id = ?2)",
            params![&now, step_id as i64],
        )
        .db_context("Failed to update plan timestamp")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(())
    }

    /// Marks a Pending or Failed step of a PartiallyCompleted plan as
    /// Skipped, so that a resumed run passes over it.
    pub fn skip_step(
        &mut self,
        plan_id: u64,
        step_id: u64,
        scope: Option<&Scope>,
    ) -> Result<PlanStep> {
        let tx = self.write_transaction()?;
        let plan = Self::require_plan(&tx, plan_id, scope)?;
        if plan.status != PlanStatus::PartiallyCompleted {
            return Err(EngineError::invalid_state(format!(
                "Steps can only be skipped on a partially completed plan; plan #{plan_id} is {}",
                plan.status.as_str()
            )));
        }

        let mut step = plan
            .steps
            .into_iter()
            .find(|s| s.id == step_id)
            .ok_or(EngineError::not_found(EntityKind::Step, step_id))?;

        let now_str = Timestamp::now().to_string();
        let updated = tx
            .execute(SKIP_STEP_SQL, params![&now_str, step_id as i64])
            .db_context("Failed to skip step")?;
        if updated == 0 {
            return Err(EngineError::invalid_state(format!(
                "Step #{step_id} is {} and cannot be skipped",
                step.status.as_str()
            )));
        }
        tx.execute(UPDATE_PLAN_TIMESTAMP_SQL, params![&now_str, plan_id as i64])
            .db_context("Failed to update plan timestamp")?;

        tx.commit().db_context("Failed to commit transaction")?;
        step.status = StepStatus::Skipped;
        Ok(step)
    }
}
