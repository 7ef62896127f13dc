//! Plan lifecycle operations.
//!
//! Drafting happens in "plan mode": `activate_plan_mode` opens a Collecting
//! plan for the scope, steps are appended with `add_step`, and
//! `finalize_plan` hands the plan over for approval. Approval and resume
//! return as soon as the transition is stored; the run continues in the
//! background (see [`super::executor`]).

use log::info;

use super::{
    events::{EngineEvent, PlanAction},
    executor::ExecutionClaim,
    Engine,
};
use crate::{
    error::{EngineError, EntityKind, Result},
    models::{Plan, PlanStatus, PlanStep, PlanTransition},
    params::AddStep,
    scope::Scope,
};

impl Engine {
    /// Opens a new Collecting plan in `scope`.
    ///
    /// Fails with `Conflict` if the scope already has a live plan and with
    /// `LimitExceeded` once `plan.max_plans` live plans exist.
    pub async fn activate_plan_mode(
        &self,
        scope: &Scope,
        model_tier: Option<&str>,
    ) -> Result<Plan> {
        if !self.config.plan.enabled {
            return Err(EngineError::invalid_state("Plan mode is disabled"));
        }
        let scope = scope.clone();
        let model_tier = model_tier.map(String::from);
        let max_plans = self.config.plan.max_plans;

        let plan = self
            .with_db(move |db| db.create_plan(&scope, model_tier.as_deref(), max_plans))
            .await?;
        info!("[PlanMode] Activated plan mode in {}: plan #{}", plan.scope, plan.id);
        self.publish_plan_status(&plan);
        Ok(plan)
    }

    /// Ends drafting. A Collecting plan is abandoned; a plan that is already
    /// Ready, Approved or Executing is left alone.
    pub async fn deactivate_plan_mode(&self, scope: &Scope) -> Result<Option<Plan>> {
        let scope = scope.clone();
        let abandoned = self.with_db(move |db| db.abandon_draft(&scope)).await?;
        if let Some(plan) = &abandoned {
            info!("[PlanMode] Abandoned draft plan #{} in {}", plan.id, plan.scope);
            self.publish_plan_status(plan);
        }
        Ok(abandoned)
    }

    pub async fn is_plan_mode_active(&self, scope: &Scope) -> Result<bool> {
        Ok(self
            .live_plan(scope)
            .await?
            .is_some_and(|p| p.status == PlanStatus::Collecting))
    }

    /// The scope's Collecting, Ready, Approved or Executing plan.
    pub async fn live_plan(&self, scope: &Scope) -> Result<Option<Plan>> {
        let scope = scope.clone();
        self.with_db(move |db| db.live_plan(&scope)).await
    }

    /// Appends a step to the scope's draft.
    pub async fn add_step(&self, scope: &Scope, params: &AddStep) -> Result<PlanStep> {
        let scope = scope.clone();
        let params = params.clone();
        let max_steps = self.config.plan.max_steps_per_plan;

        let step = self
            .with_db(move |db| {
                db.add_step(
                    &scope,
                    &params.tool_name,
                    &params.description,
                    &params.arguments,
                    max_steps,
                )
            })
            .await?;
        info!(
            "[PlanMode] Plan #{} step {}: {} ({})",
            step.plan_id,
            step.order + 1,
            step.tool_name,
            step.description
        );
        Ok(step)
    }

    /// Moves the scope's draft to Ready and asks for approval.
    pub async fn finalize_plan(
        &self,
        scope: &Scope,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Plan> {
        let scope = scope.clone();
        let title = title.map(String::from);
        let description = description.map(String::from);

        let plan = self
            .with_db(move |db| db.finalize_plan(&scope, title.as_deref(), description.as_deref()))
            .await?;
        info!(
            "[PlanMode] Plan #{} '{}' is ready for approval ({} steps)",
            plan.id,
            plan.title,
            plan.steps.len()
        );
        self.publish_plan_status(&plan);
        self.events.publish(EngineEvent::PlanReady {
            scope: plan.scope.clone(),
            plan_id: plan.id,
            title: plan.title.clone(),
            step_count: plan.steps.len(),
            actions: vec![PlanAction::Approve, PlanAction::Cancel],
        });
        Ok(plan)
    }

    /// Approves a Ready plan and starts executing it in the background.
    pub async fn approve_plan(&self, id: u64, scope: Option<&Scope>) -> Result<Plan> {
        self.start_run(id, scope, PlanTransition::Approve).await
    }

    /// Re-runs a PartiallyCompleted plan from its first Pending or Failed
    /// step. Completed and Skipped steps are not touched.
    pub async fn resume_plan(&self, id: u64, scope: Option<&Scope>) -> Result<Plan> {
        self.start_run(id, scope, PlanTransition::Resume).await
    }

    async fn start_run(
        &self,
        id: u64,
        scope: Option<&Scope>,
        transition: PlanTransition,
    ) -> Result<Plan> {
        let claim: ExecutionClaim = self.executions.claim(id).await.ok_or_else(|| {
            EngineError::conflict(format!("Plan #{id} is already being executed"))
        })?;

        let scope = scope.cloned();
        let outcome = self
            .with_db(move |db| db.transition_plan(id, scope.as_ref(), transition))
            .await;

        match outcome {
            Ok(plan) => {
                info!("[PlanMode] Plan #{} {}d: '{}'", plan.id, transition.verb(), plan.title);
                self.publish_plan_status(&plan);
                self.spawn_execution(claim);
                Ok(plan)
            }
            Err(e) => {
                self.executions.release(claim).await;
                Err(e)
            }
        }
    }

    /// Cancels a plan that is not yet Completed or Cancelled.
    ///
    /// A running execution stops before its next step.
    pub async fn cancel_plan(&self, id: u64, scope: Option<&Scope>) -> Result<Plan> {
        let scope = scope.cloned();
        let plan = self
            .with_db(move |db| db.transition_plan(id, scope.as_ref(), PlanTransition::Cancel))
            .await?;

        if self.executions.cancel(id).await {
            info!("[PlanMode] Signalled running execution of plan #{id} to stop");
        }
        info!("[PlanMode] Plan #{} '{}' cancelled", plan.id, plan.title);
        self.publish_plan_status(&plan);
        Ok(plan)
    }

    /// Marks a Pending or Failed step of a PartiallyCompleted plan Skipped.
    pub async fn skip_step(
        &self,
        plan_id: u64,
        step_id: u64,
        scope: Option<&Scope>,
    ) -> Result<PlanStep> {
        let scope = scope.cloned();
        let step = self
            .with_db(move |db| db.skip_step(plan_id, step_id, scope.as_ref()))
            .await?;
        info!("[PlanMode] Plan #{plan_id} step {} skipped", step.order + 1);
        Ok(step)
    }

    /// Routes a press of an approval button published with `PlanReady`.
    pub async fn handle_approval_callback(
        &self,
        plan_id: u64,
        action: PlanAction,
        scope: Option<&Scope>,
    ) -> Result<Plan> {
        match action {
            PlanAction::Approve => self.approve_plan(plan_id, scope).await,
            PlanAction::Cancel => self.cancel_plan(plan_id, scope).await,
        }
    }

    pub async fn get_plan(&self, id: u64, scope: Option<&Scope>) -> Result<Plan> {
        let scope = scope.cloned();
        self.with_db(move |db| db.get_plan(id, scope.as_ref()))
            .await?
            .ok_or(EngineError::not_found(EntityKind::Plan, id))
    }

    /// Plans newest first.
    pub async fn list_plans(&self, scope: Option<&Scope>) -> Result<Vec<Plan>> {
        let scope = scope.cloned();
        self.with_db(move |db| db.list_plans(scope.as_ref(), &[]))
            .await
    }

    /// The newest plan in one of `statuses`.
    pub async fn latest_plan(
        &self,
        scope: Option<&Scope>,
        statuses: &[PlanStatus],
    ) -> Result<Option<Plan>> {
        let scope = scope.cloned();
        let statuses = statuses.to_vec();
        Ok(self
            .with_db(move |db| db.list_plans(scope.as_ref(), &statuses))
            .await?
            .into_iter()
            .next())
    }

    /// Deletes a plan that is no longer live.
    pub async fn delete_plan(&self, id: u64, scope: Option<&Scope>) -> Result<Plan> {
        let scope = scope.cloned();
        let plan = self
            .with_db(move |db| db.delete_plan(id, scope.as_ref()))
            .await?;
        info!("[PlanMode] Deleted plan #{} '{}'", plan.id, plan.title);
        Ok(plan)
    }

    /// Waits for the plan's background run, if any, to finish.
    pub async fn wait_for_plan(&self, id: u64) {
        self.executions.wait(id).await;
    }

    /// Waits until no plan run is in flight.
    pub async fn wait_for_idle(&self) {
        self.executions.wait_idle().await;
    }
}
