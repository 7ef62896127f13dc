//! Stepwise execution of approved plans.
//!
//! A run is a spawned task that owns a single-owner claim in the
//! [`ExecutionRegistry`]. It moves the plan from Approved to Executing,
//! attempts each runnable step in order through the [`StepExecutor`], and
//! finally derives Completed or PartiallyCompleted from the step statuses.
//! Cancellation is cooperative: the run checks its token between steps.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use super::{events::EngineEvent, Engine};
use crate::{
    display::ExecutionSummary,
    error::{EngineError, ErrorKind, Result},
    models::{Plan, PlanTransition, StepStatus},
    scope::Scope,
};

/// Everything a capability needs to run one step.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub plan_id: u64,
    pub step_id: u64,
    pub scope: Scope,
    pub tool_name: String,
    pub description: String,
    pub arguments: serde_json::Value,
    /// The plan's routing hint, passed through untouched
    pub model_tier: Option<String>,
}

/// What the capability reported for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed { output: String },
    Failed { error: String },
    /// The capability gave up waiting on its backend
    NoResponse { detail: String },
    /// The capability aborted the step; the step returns to Pending
    Cancelled,
}

/// External capability invoked once per plan step.
///
/// Timeouts are the implementation's concern; report them as
/// [`StepOutcome::NoResponse`].
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, request: StepRequest) -> StepOutcome;
}

/// Step executor used when none is configured: every step reports that no
/// capability answered.
pub struct UnavailableStepExecutor;

#[async_trait]
impl StepExecutor for UnavailableStepExecutor {
    async fn execute(&self, request: StepRequest) -> StepOutcome {
        StepOutcome::NoResponse {
            detail: format!("no step executor is configured for `{}`", request.tool_name),
        }
    }
}

struct RunningPlan {
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Claim returned by [`ExecutionRegistry::claim`]. The run signals
/// completion through it on release.
pub(crate) struct ExecutionClaim {
    plan_id: u64,
    token: CancellationToken,
    done: watch::Sender<bool>,
}

/// Registry of in-flight plan runs keyed by plan id.
///
/// At most one run per plan holds a claim at a time. Clone is cheap.
#[derive(Clone, Default)]
pub struct ExecutionRegistry {
    runs: Arc<RwLock<HashMap<u64, RunningPlan>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the plan for a new run. Returns `None` if a run already holds it.
    pub(crate) async fn claim(&self, plan_id: u64) -> Option<ExecutionClaim> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&plan_id) {
            return None;
        }

        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        runs.insert(
            plan_id,
            RunningPlan {
                token: token.clone(),
                done: done_rx,
            },
        );
        Some(ExecutionClaim {
            plan_id,
            token,
            done: done_tx,
        })
    }

    /// Drops a claim and wakes anyone waiting on the run.
    pub(crate) async fn release(&self, claim: ExecutionClaim) {
        self.runs.write().await.remove(&claim.plan_id);
        let _ = claim.done.send(true);
    }

    /// Requests cooperative cancellation. Returns true if a run was found.
    pub async fn cancel(&self, plan_id: u64) -> bool {
        match self.runs.read().await.get(&plan_id) {
            Some(run) => {
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, plan_id: u64) -> bool {
        self.runs.read().await.contains_key(&plan_id)
    }

    pub async fn running_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Waits until the plan's current run, if any, has finished.
    pub async fn wait(&self, plan_id: u64) {
        let done = self.runs.read().await.get(&plan_id).map(|r| r.done.clone());
        if let Some(mut done) = done {
            // A dropped sender also means the run is over.
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Waits until no run is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<u64> = self.runs.read().await.keys().copied().collect();
            if pending.is_empty() {
                return;
            }
            for plan_id in pending {
                self.wait(plan_id).await;
            }
        }
    }
}

/// Cuts `text` to `max_len` characters, marking the cut with `...`.
pub(crate) fn truncate_result(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

const ABORT_ATTEMPTS: u32 = 3;
const ABORT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Errors that mean another actor moved the plan first (a cancel landing
/// before the run began, for example) rather than a broken run.
fn is_superseded(error: &EngineError) -> bool {
    error.kind() == ErrorKind::InvalidState
}

enum StepVerdict {
    Succeeded,
    Failed,
    Interrupted,
}

impl Engine {
    /// Starts a background run for a plan the caller has already moved to
    /// Approved under `claim`.
    pub(crate) fn spawn_execution(&self, claim: ExecutionClaim) {
        let engine = self.clone();
        tokio::spawn(async move {
            let plan_id = claim.plan_id;
            if let Err(e) = engine.run_plan(plan_id, &claim.token).await {
                if is_superseded(&e) {
                    info!("[PlanExec] Plan #{plan_id} run stopped: {e}");
                } else {
                    error!("[PlanExec] Plan #{plan_id} run failed: {e}");
                }
                engine.abort_run(plan_id, &e).await;
            }
            engine.executions.release(claim).await;
        });
    }

    /// Leaves a run that died on an error in a resumable state.
    ///
    /// The store may be the thing that failed, so the write is retried a few
    /// times before giving up; startup recovery covers anything left behind.
    async fn abort_run(&self, plan_id: u64, cause: &EngineError) {
        let reason = truncate_result(
            &format!("Execution aborted: {cause}"),
            self.config.plan.max_result_length,
        );

        for attempt in 1..=ABORT_ATTEMPTS {
            let reason = reason.clone();
            match self
                .with_db(move |db| db.abort_execution(plan_id, &reason))
                .await
            {
                Ok(Some(plan)) => {
                    warn!(
                        "[PlanExec] Plan #{plan_id} aborted as {}",
                        plan.status.as_str()
                    );
                    self.publish_plan_status(&plan);
                    self.events.publish(EngineEvent::PlanExecutionFinished {
                        scope: plan.scope.clone(),
                        plan_id: plan.id,
                        status: plan.status,
                        summary: ExecutionSummary(&plan).to_string(),
                    });
                    return;
                }
                Ok(None) => return,
                Err(e) if attempt < ABORT_ATTEMPTS => {
                    debug!("[PlanExec] Could not abort plan #{plan_id} (attempt {attempt}): {e}");
                    tokio::time::sleep(ABORT_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!("[PlanExec] Plan #{plan_id} left unfinished after a failed run: {e}");
                }
            }
        }
    }

    async fn run_plan(&self, plan_id: u64, token: &CancellationToken) -> Result<()> {
        let plan = self
            .with_db(move |db| db.transition_plan(plan_id, None, PlanTransition::Begin))
            .await?;
        self.publish_plan_status(&plan);
        info!(
            "[PlanExec] Starting execution of plan #{} '{}' ({} steps)",
            plan.id,
            plan.title,
            plan.steps.len()
        );

        let stop_on_failure = self.config.plan.stop_on_failure;
        let runnable: Vec<u64> = plan
            .steps
            .iter()
            .filter(|s| s.status.is_runnable())
            .map(|s| s.id)
            .collect();

        for step_id in runnable {
            if token.is_cancelled() {
                info!("[PlanExec] Plan #{plan_id} cancelled; stopping before step #{step_id}");
                break;
            }

            match self.run_step(&plan, step_id).await? {
                StepVerdict::Succeeded => {}
                StepVerdict::Failed if stop_on_failure => break,
                StepVerdict::Failed => {}
                StepVerdict::Interrupted => break,
            }
        }

        let finished = self.with_db(move |db| db.finish_execution(plan_id)).await?;
        let plan = match finished {
            Some(plan) => {
                self.publish_plan_status(&plan);
                plan
            }
            // Cancelled mid-run: report whatever state the steps reached.
            None => match self.with_db(move |db| db.get_plan(plan_id, None)).await? {
                Some(plan) => plan,
                None => {
                    warn!("[PlanExec] Plan #{plan_id} disappeared during execution");
                    return Ok(());
                }
            },
        };

        info!(
            "[PlanExec] Plan #{} finished as {} ({}/{} completed, {} failed)",
            plan.id,
            plan.status.as_str(),
            plan.completed_step_count(),
            plan.steps.len(),
            plan.failed_step_count()
        );
        self.events.publish(EngineEvent::PlanExecutionFinished {
            scope: plan.scope.clone(),
            plan_id: plan.id,
            status: plan.status,
            summary: ExecutionSummary(&plan).to_string(),
        });
        Ok(())
    }

    async fn run_step(&self, plan: &Plan, step_id: u64) -> Result<StepVerdict> {
        let Some(step) = self.with_db(move |db| db.claim_step(step_id)).await? else {
            debug!("[PlanExec] Step #{step_id} is no longer runnable; skipping");
            return Ok(StepVerdict::Succeeded);
        };

        let number = step.order + 1;
        info!(
            "[PlanExec] Executing step {number}: {} ({})",
            step.tool_name, step.description
        );

        let request = StepRequest {
            plan_id: plan.id,
            step_id,
            scope: plan.scope.clone(),
            tool_name: step.tool_name.clone(),
            description: step.description.clone(),
            arguments: step.arguments.clone(),
            model_tier: plan.model_tier.clone(),
        };
        let outcome = AssertUnwindSafe(self.step_executor.execute(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| StepOutcome::Failed {
                error: format!("Execution failed: {}", panic_message(payload.as_ref())),
            });

        let max_len = self.config.plan.max_result_length;
        let (status, result, verdict) = match outcome {
            StepOutcome::Completed { output } => {
                let output = truncate_result(&output, max_len);
                info!("[PlanExec] Step {number} completed: {output}");
                (StepStatus::Completed, Some(output), StepVerdict::Succeeded)
            }
            StepOutcome::Failed { error } => {
                let error = truncate_result(&error, max_len);
                warn!("[PlanExec] Step {number} failed: {error}");
                (StepStatus::Failed, Some(error), StepVerdict::Failed)
            }
            StepOutcome::NoResponse { detail } => {
                let detail = truncate_result(&format!("No response: {detail}"), max_len);
                warn!("[PlanExec] Step {number} got no response from its executor: {detail}");
                (StepStatus::Failed, Some(detail), StepVerdict::Failed)
            }
            StepOutcome::Cancelled => {
                info!("[PlanExec] Step {number} was cancelled by its executor");
                (StepStatus::Pending, None, StepVerdict::Interrupted)
            }
        };

        self.with_db(move |db| db.record_step_result(step_id, status, result.as_deref()))
            .await?;
        Ok(verdict)
    }

    pub(crate) fn publish_plan_status(&self, plan: &Plan) {
        self.events.publish(EngineEvent::PlanStatusChanged {
            scope: plan.scope.clone(),
            plan_id: plan.id,
            status: plan.status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_result() {
        assert_eq!(truncate_result("short", 10), "short");
        assert_eq!(truncate_result("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_result("abcdefghijkl", 5), "abcde...");
        assert_eq!(truncate_result("ééééé", 2), "éé...");
    }

    #[test]
    fn test_lost_race_is_not_a_run_failure() {
        assert!(is_superseded(&EngineError::invalid_state(
            "Cannot begin plan #3: it is cancelled"
        )));
        assert!(!is_superseded(&EngineError::Database {
            message: "Failed to record step result".to_string(),
            source: rusqlite::Error::InvalidQuery,
        }));
    }

    #[tokio::test]
    async fn test_registry_single_owner() {
        let registry = ExecutionRegistry::new();
        let claim = registry.claim(4).await.unwrap();
        assert!(registry.claim(4).await.is_none());
        assert!(registry.is_running(4).await);
        assert_eq!(registry.running_count().await, 1);

        registry.release(claim).await;
        assert!(!registry.is_running(4).await);
        assert!(registry.claim(4).await.is_some());
    }

    #[tokio::test]
    async fn test_registry_cancel() {
        let registry = ExecutionRegistry::new();
        let claim = registry.claim(9).await.unwrap();
        assert!(!claim.token.is_cancelled());

        assert!(registry.cancel(9).await);
        assert!(claim.token.is_cancelled());
        assert!(!registry.cancel(10).await);
    }

    #[tokio::test]
    async fn test_registry_wait_returns_after_release() {
        let registry = ExecutionRegistry::new();
        let claim = registry.claim(1).await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_idle().await })
        };
        registry.release(claim).await;
        waiter.await.unwrap();

        // Nothing in flight returns immediately.
        registry.wait(1).await;
    }
}
