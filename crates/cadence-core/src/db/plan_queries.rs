//! Plan lifecycle operations and queries.

use jiff::Timestamp;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{
    rows::{id_at, parsed_at, scope_at, timestamp_at},
    scope_param,
};
use crate::{
    error::{DatabaseResultExt, EngineError, EntityKind, Result},
    models::{Plan, PlanStatus, PlanTransition},
    scope::Scope,
};

const PLAN_COLUMNS: &str =
    "id, scope_key, title, description, status, model_tier, created_at, updated_at";
const LIVE_STATUSES: &str = "('collecting', 'ready', 'approved', 'executing')";
const DEFAULT_TITLE: &str = "Untitled plan";
const INTERRUPTED_RESULT: &str = "Interrupted by restart/crash during execution";

const INSERT_PLAN_SQL: &str = "INSERT INTO plans (scope_key, title, status, model_tier, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)";
const SELECT_PLAN_SQL: &str = "SELECT id, scope_key, title, description, status, model_tier, created_at, updated_at FROM plans WHERE id = ?1 AND (?2 IS NULL OR scope_key = ?2)";
const UPDATE_PLAN_STATUS_SQL: &str =
    "UPDATE plans SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4";
const UPDATE_PLAN_TITLE_SQL: &str = "UPDATE plans SET title = ?1, description = COALESCE(?2, description), updated_at = ?3 WHERE id = ?4";
const DELETE_PLAN_SQL: &str = "DELETE FROM plans WHERE id = ?1";
const SELECT_EXECUTING_PLAN_IDS_SQL: &str =
    "SELECT id FROM plans WHERE status IN ('executing', 'approved')";
const FAIL_IN_PROGRESS_STEPS_SQL: &str = "UPDATE plan_steps SET status = 'failed', result = ?1, updated_at = ?2 WHERE plan_id = ?3 AND status = 'in_progress'";
const MARK_PLAN_INTERRUPTED_SQL: &str =
    "UPDATE plans SET status = 'partially_completed', updated_at = ?1 WHERE id = ?2";

impl super::Database {
    fn build_plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
        Ok(Plan {
            id: id_at(row, 0)?,
            scope: scope_at(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: parsed_at(row, 4)?,
            model_tier: row.get(5)?,
            created_at: timestamp_at(row, 6)?,
            updated_at: timestamp_at(row, 7)?,
            steps: Vec::new(),
        })
    }

    pub(crate) fn fetch_plan(
        conn: &Connection,
        id: u64,
        scope: Option<&Scope>,
    ) -> Result<Option<Plan>> {
        let plan = conn
            .query_row(
                SELECT_PLAN_SQL,
                params![id as i64, scope_param(scope)],
                Self::build_plan_from_row,
            )
            .optional()
            .db_context("Failed to query plan")?;

        match plan {
            Some(mut plan) => {
                plan.steps = Self::load_steps(conn, plan.id)?;
                Ok(Some(plan))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn require_plan(conn: &Connection, id: u64, scope: Option<&Scope>) -> Result<Plan> {
        Self::fetch_plan(conn, id, scope)?.ok_or(EngineError::not_found(EntityKind::Plan, id))
    }

    fn query_plans(conn: &Connection, query: &str, args: impl rusqlite::Params) -> Result<Vec<Plan>> {
        let mut stmt = conn.prepare(query).db_context("Failed to prepare query")?;
        let plans = stmt
            .query_map(args, Self::build_plan_from_row)
            .db_context("Failed to query plans")?
            .collect::<rusqlite::Result<Vec<Plan>>>()
            .db_context("Failed to parse plan rows")?;

        plans
            .into_iter()
            .map(|mut plan| {
                plan.steps = Self::load_steps(conn, plan.id)?;
                Ok(plan)
            })
            .collect()
    }

    fn fetch_live_plan(conn: &Connection, scope: &Scope) -> Result<Option<Plan>> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE scope_key = ?1 AND status IN {LIVE_STATUSES}"
        );
        Ok(Self::query_plans(conn, &query, params![scope.storage_key()])?
            .into_iter()
            .next())
    }

    /// Opens a new Collecting plan for `scope`.
    ///
    /// Fails with `Conflict` if the scope already has a live plan, and with
    /// `LimitExceeded` if `max_plans` live plans exist across all scopes.
    pub fn create_plan(
        &mut self,
        scope: &Scope,
        model_tier: Option<&str>,
        max_plans: u32,
    ) -> Result<Plan> {
        let tx = self.write_transaction()?;

        if let Some(existing) = Self::fetch_live_plan(&tx, scope)? {
            return Err(EngineError::conflict(format!(
                "Plan #{} is already {} in this conversation",
                existing.id,
                existing.status.as_str()
            )));
        }

        let live: i64 = tx
            .query_row(
                &format!("SELECT COUNT(*) FROM plans WHERE status IN {LIVE_STATUSES}"),
                [],
                |row| row.get(0),
            )
            .db_context("Failed to count live plans")?;
        if live >= i64::from(max_plans) {
            return Err(EngineError::limit_exceeded("live plans", max_plans));
        }

        let now = Timestamp::now();
        tx.execute(
            INSERT_PLAN_SQL,
            params![
                scope.storage_key(),
                DEFAULT_TITLE,
                PlanStatus::Collecting.as_str(),
                model_tier,
                now.to_string()
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                EngineError::conflict("A live plan already exists in this conversation")
            }
            _ => EngineError::database("Failed to insert plan").with_source(e),
        })?;
        let id = tx.last_insert_rowid() as u64;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Plan {
            id,
            scope: scope.clone(),
            title: DEFAULT_TITLE.to_string(),
            description: None,
            status: PlanStatus::Collecting,
            model_tier: model_tier.map(String::from),
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
        })
    }

    /// Retrieves a plan with its steps.
    pub fn get_plan(&self, id: u64, scope: Option<&Scope>) -> Result<Option<Plan>> {
        Self::fetch_plan(&self.connection, id, scope)
    }

    /// The scope's live plan, if any.
    pub fn live_plan(&self, scope: &Scope) -> Result<Option<Plan>> {
        Self::fetch_live_plan(&self.connection, scope)
    }

    /// Lists plans newest first. An empty `statuses` slice means any status.
    pub fn list_plans(&self, scope: Option<&Scope>, statuses: &[PlanStatus]) -> Result<Vec<Plan>> {
        let mut query =
            format!("SELECT {PLAN_COLUMNS} FROM plans WHERE (?1 IS NULL OR scope_key = ?1)");
        if !statuses.is_empty() {
            let list = statuses
                .iter()
                .map(|s| format!("'{}'", s.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            query.push_str(&format!(" AND status IN ({list})"));
        }
        query.push_str(" ORDER BY id DESC");

        Self::query_plans(&self.connection, &query, params![scope_param(scope)])
    }

    /// Applies a state-machine transition with a compare-and-swap on the
    /// current status.
    pub fn transition_plan(
        &mut self,
        id: u64,
        scope: Option<&Scope>,
        transition: PlanTransition,
    ) -> Result<Plan> {
        let tx = self.write_transaction()?;
        let mut plan = Self::require_plan(&tx, id, scope)?;
        let next = Self::apply_transition(&tx, &plan, transition)?;

        tx.commit().db_context("Failed to commit transaction")?;

        plan.status = next;
        plan.updated_at = Timestamp::now();
        Ok(plan)
    }

    fn apply_transition(
        conn: &Connection,
        plan: &Plan,
        transition: PlanTransition,
    ) -> Result<PlanStatus> {
        let next = plan.status.apply(transition).ok_or_else(|| {
            EngineError::invalid_state(format!(
                "Cannot {} plan #{}: it is {}",
                transition.verb(),
                plan.id,
                plan.status.as_str()
            ))
        })?;

        let updated = conn
            .execute(
                UPDATE_PLAN_STATUS_SQL,
                params![
                    next.as_str(),
                    Timestamp::now().to_string(),
                    plan.id as i64,
                    plan.status.as_str()
                ],
            )
            .db_context("Failed to update plan status")?;
        if updated == 0 {
            return Err(EngineError::conflict(format!(
                "Plan #{} was changed concurrently",
                plan.id
            )));
        }
        Ok(next)
    }

    /// Finishes drafting: the scope's Collecting plan becomes Ready.
    ///
    /// Without a title the first step's description names the plan.
    pub fn finalize_plan(
        &mut self,
        scope: &Scope,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Plan> {
        let tx = self.write_transaction()?;
        let mut plan = Self::fetch_live_plan(&tx, scope)?
            .filter(|p| p.status == PlanStatus::Collecting)
            .ok_or_else(|| EngineError::invalid_state("No plan is being drafted here"))?;

        if plan.steps.is_empty() {
            return Err(EngineError::invalid_state(format!(
                "Plan #{} has no steps to approve",
                plan.id
            )));
        }

        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| plan.steps[0].description.clone());
        let now = Timestamp::now();
        tx.execute(
            UPDATE_PLAN_TITLE_SQL,
            params![&title, description, now.to_string(), plan.id as i64],
        )
        .db_context("Failed to update plan title")?;

        let next = Self::apply_transition(&tx, &plan, PlanTransition::Finalize)?;
        tx.commit().db_context("Failed to commit transaction")?;

        plan.title = title;
        if let Some(description) = description {
            plan.description = Some(description.to_string());
        }
        plan.status = next;
        plan.updated_at = now;
        Ok(plan)
    }

    /// Abandons the scope's Collecting plan. Other live plans are untouched.
    pub fn abandon_draft(&mut self, scope: &Scope) -> Result<Option<Plan>> {
        let tx = self.write_transaction()?;
        let Some(mut plan) =
            Self::fetch_live_plan(&tx, scope)?.filter(|p| p.status == PlanStatus::Collecting)
        else {
            return Ok(None);
        };

        plan.status = Self::apply_transition(&tx, &plan, PlanTransition::Abandon)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(Some(plan))
    }

    /// Ends an execution run: an Executing plan becomes Completed when every
    /// step is Completed or Skipped, otherwise PartiallyCompleted.
    ///
    /// Returns `None` when the plan left Executing during the run (for
    /// example, it was cancelled).
    pub fn finish_execution(&mut self, id: u64) -> Result<Option<Plan>> {
        let tx = self.write_transaction()?;
        let Some(mut plan) = Self::fetch_plan(&tx, id, None)? else {
            return Ok(None);
        };
        if plan.status != PlanStatus::Executing {
            return Ok(None);
        }

        let all_steps_done = plan.all_steps_done();
        plan.status =
            Self::apply_transition(&tx, &plan, PlanTransition::Finish { all_steps_done })?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(Some(plan))
    }

    /// Closes out a run that stopped on an error instead of finishing.
    ///
    /// InProgress steps become Failed with `reason` as their result, then an
    /// Executing plan is finished as usual and an Approved plan that never
    /// began becomes PartiallyCompleted. Returns `None` when the plan is in
    /// neither state.
    pub fn abort_execution(&mut self, id: u64, reason: &str) -> Result<Option<Plan>> {
        let tx = self.write_transaction()?;
        let Some(plan) = Self::fetch_plan(&tx, id, None)? else {
            return Ok(None);
        };
        if !matches!(plan.status, PlanStatus::Executing | PlanStatus::Approved) {
            return Ok(None);
        }

        let now_str = Timestamp::now().to_string();
        tx.execute(
            FAIL_IN_PROGRESS_STEPS_SQL,
            params![reason, &now_str, id as i64],
        )
        .db_context("Failed to fail aborted steps")?;

        let Some(mut plan) = Self::fetch_plan(&tx, id, None)? else {
            return Ok(None);
        };
        if plan.status == PlanStatus::Executing {
            let all_steps_done = plan.all_steps_done();
            plan.status =
                Self::apply_transition(&tx, &plan, PlanTransition::Finish { all_steps_done })?;
        } else {
            tx.execute(MARK_PLAN_INTERRUPTED_SQL, params![&now_str, id as i64])
                .db_context("Failed to mark plan interrupted")?;
            plan.status = PlanStatus::PartiallyCompleted;
        }

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(Some(plan))
    }

    /// Deletes a finished plan and its steps.
    pub fn delete_plan(&mut self, id: u64, scope: Option<&Scope>) -> Result<Plan> {
        let tx = self.write_transaction()?;
        let plan = Self::require_plan(&tx, id, scope)?;

        if plan.status.is_live() {
            return Err(EngineError::invalid_state(format!(
                "Plan #{id} is {}; cancel it before deleting",
                plan.status.as_str()
            )));
        }

        tx.execute(DELETE_PLAN_SQL, params![id as i64])
            .db_context("Failed to delete plan")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(plan)
    }

    /// Startup recovery for runs cut short by a crash or restart.
    ///
    /// Plans left Executing or Approved become PartiallyCompleted, and their
    /// InProgress steps become Failed. Returns the recovered plan ids.
    pub fn recover_interrupted_plans(&mut self) -> Result<Vec<u64>> {
        let tx = self.write_transaction()?;

        let ids: Vec<i64> = {
            let mut stmt = tx
                .prepare(SELECT_EXECUTING_PLAN_IDS_SQL)
                .db_context("Failed to prepare query")?;
            let ids = stmt
                .query_map([], |row| row.get(0))
                .db_context("Failed to query interrupted plans")?
                .collect::<rusqlite::Result<Vec<i64>>>()
                .db_context("Failed to parse plan ids")?;
            ids
        };

        let now_str = Timestamp::now().to_string();
        for id in &ids {
            tx.execute(
                FAIL_IN_PROGRESS_STEPS_SQL,
                params![INTERRUPTED_RESULT, &now_str, id],
            )
            .db_context("Failed to fail interrupted steps")?;
            tx.execute(MARK_PLAN_INTERRUPTED_SQL, params![&now_str, id])
                .db_context("Failed to mark plan interrupted")?;
        }

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(ids.into_iter().map(|id| id as u64).collect())
    }
}
