//! Cron scheduler: schedule entries and the periodic tick.
//!
//! Each tick loads the enabled entries, fires the ones whose
//! `next_execution_at` has passed, and records every fired entry whether or
//! not its trigger found work. Recording recomputes the next occurrence from
//! the tick instant, so an entry that missed several occurrences while the
//! process was down fires once and then moves on.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use jiff::Timestamp;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{events::EngineEvent, Engine};
use crate::{
    error::{EngineError, EntityKind, Result},
    models::{Goal, GoalStatus, ScheduleEntry, ScheduleTarget, Task, TaskStatus},
    params::{CreateSchedule, FrequencySchedule},
    scope::Scope,
};

/// What the work runner reported for a scheduled goal or task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRunOutcome {
    Completed { result: String },
    Failed { error: String },
    /// Handed to an asynchronous agent loop; the task stays InProgress
    /// until someone reports its status.
    Dispatched,
}

/// The agent loop that scheduled work is handed to.
#[async_trait]
pub trait WorkRunner: Send + Sync {
    /// Works on one task of an Active goal.
    async fn run_task(&self, goal: &Goal, task: &Task) -> TaskRunOutcome;

    /// Breaks down a goal that has no tasks yet.
    async fn plan_goal(&self, goal: &Goal) -> TaskRunOutcome;
}

/// Runner used when none is configured.
pub struct UnavailableWorkRunner;

#[async_trait]
impl WorkRunner for UnavailableWorkRunner {
    async fn run_task(&self, _goal: &Goal, task: &Task) -> TaskRunOutcome {
        TaskRunOutcome::Failed {
            error: format!("No work runner is configured to run task #{}", task.id),
        }
    }

    async fn plan_goal(&self, goal: &Goal) -> TaskRunOutcome {
        TaskRunOutcome::Failed {
            error: format!("No work runner is configured to plan goal #{}", goal.id),
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entries that were due and got recorded
    pub fired: Vec<u64>,
    /// How many of those found work to do
    pub acted: usize,
    /// Triggers or records that failed
    pub failures: usize,
    /// The tick was skipped because the previous one was still running
    pub overlapped: bool,
    /// Auto mode is off, so nothing was looked at
    pub paused: bool,
}

/// Combined listing for management surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardOverview {
    pub goals: Vec<Goal>,
    pub schedules: Vec<ScheduleEntry>,
}

/// Running scheduler loop.
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the loop after any tick in progress and waits for it.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            warn!("[Scheduler] Loop ended abnormally: {e}");
        }
    }
}

struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Engine {
    /// Creates a schedule from a raw cron expression.
    ///
    /// The target must exist (and, for a scoped caller, belong to the
    /// scope); its goal's scope becomes the schedule's scope.
    pub async fn create_schedule(
        &self,
        scope: Option<&Scope>,
        params: &CreateSchedule,
    ) -> Result<ScheduleEntry> {
        let cron = params.validate()?;
        let scope = scope.cloned();
        let target = params.target;
        let max_executions = params.max_executions;

        let entry = self
            .with_db(move |db| {
                db.create_schedule(scope.as_ref(), target, &cron, max_executions, Timestamp::now())
            })
            .await?;
        info!(
            "[Scheduler] Created schedule #{} for {}: {}",
            entry.id, entry.target, entry.cron_expression
        );
        Ok(entry)
    }

    /// Creates a schedule from daily / weekdays / weekly / custom input.
    pub async fn create_schedule_from_frequency(
        &self,
        scope: Option<&Scope>,
        params: &FrequencySchedule,
    ) -> Result<ScheduleEntry> {
        let request = params.validate()?;
        self.create_schedule(scope, &request).await
    }

    pub async fn get_schedule(&self, id: u64, scope: Option<&Scope>) -> Result<ScheduleEntry> {
        let scope = scope.cloned();
        self.with_db(move |db| db.get_schedule(id, scope.as_ref()))
            .await?
            .ok_or(EngineError::not_found(EntityKind::Schedule, id))
    }

    pub async fn list_schedules(&self, scope: Option<&Scope>) -> Result<Vec<ScheduleEntry>> {
        let scope = scope.cloned();
        self.with_db(move |db| db.list_schedules(scope.as_ref()))
            .await
    }

    pub async fn schedules_for_target(
        &self,
        target: ScheduleTarget,
        scope: Option<&Scope>,
    ) -> Result<Vec<ScheduleEntry>> {
        let scope = scope.cloned();
        self.with_db(move |db| db.schedules_for_target(target, scope.as_ref()))
            .await
    }

    pub async fn delete_schedule(&self, id: u64, scope: Option<&Scope>) -> Result<ScheduleEntry> {
        let scope = scope.cloned();
        let entry = self
            .with_db(move |db| db.delete_schedule(id, scope.as_ref()))
            .await?;
        info!("[Scheduler] Deleted schedule #{id} for {}", entry.target);
        Ok(entry)
    }

    /// Every goal with its tasks, and every schedule, across all scopes.
    pub async fn dashboard_overview(&self) -> Result<DashboardOverview> {
        self.with_db(|db| {
            Ok(DashboardOverview {
                goals: db.list_goals(None, None)?,
                schedules: db.list_schedules(None)?,
            })
        })
        .await
    }

    /// Fires every entry due at `now`.
    ///
    /// A call that overlaps a tick still in progress does nothing and
    /// reports `overlapped`.
    pub async fn run_due_schedules(&self, now: Timestamp) -> Result<TickReport> {
        if self
            .tick_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[Scheduler] Previous tick still running; skipping");
            return Ok(TickReport {
                overlapped: true,
                ..TickReport::default()
            });
        }
        let _guard = TickGuard(&self.tick_running);

        if !self.is_auto_mode_enabled().await? {
            debug!("[Scheduler] Auto mode is off; skipping tick");
            return Ok(TickReport {
                paused: true,
                ..TickReport::default()
            });
        }

        let due: Vec<ScheduleEntry> = self
            .with_db(|db| db.enabled_schedules())
            .await?
            .into_iter()
            .filter(|entry| entry.is_due(now))
            .collect();

        let mut report = TickReport::default();
        for entry in due {
            let acted = match self.fire(&entry).await {
                Ok(acted) => acted,
                Err(e) => {
                    error!("[Scheduler] Schedule #{} for {} failed: {e}", entry.id, entry.target);
                    report.failures += 1;
                    false
                }
            };

            let id = entry.id;
            match self
                .with_db(move |db| db.record_schedule_execution(id, now))
                .await
            {
                Ok(Some(updated)) if !updated.enabled => info!(
                    "[Scheduler] Schedule #{id} exhausted after {} executions",
                    updated.execution_count
                ),
                Ok(Some(_)) => {}
                Ok(None) => debug!("[Scheduler] Schedule #{id} was deleted while firing"),
                Err(e) => {
                    error!("[Scheduler] Failed to record execution of schedule #{id}: {e}");
                    report.failures += 1;
                }
            }

            self.events.publish(EngineEvent::ScheduleFired {
                scope: entry.scope.clone(),
                schedule_id: id,
                target: entry.target,
                acted,
            });
            report.fired.push(id);
            if acted {
                report.acted += 1;
            }
        }

        Ok(report)
    }

    async fn fire(&self, entry: &ScheduleEntry) -> Result<bool> {
        debug!("[Scheduler] Firing schedule #{} for {}", entry.id, entry.target);
        match entry.target {
            ScheduleTarget::Goal(goal_id) => self.fire_goal(goal_id).await,
            ScheduleTarget::Task(task_id) => self.fire_task(task_id).await,
        }
    }

    async fn fire_goal(&self, goal_id: u64) -> Result<bool> {
        let Some(goal) = self.with_db(move |db| db.get_goal(goal_id, None)).await? else {
            warn!("[Scheduler] Goal #{goal_id} no longer exists; skipping");
            return Ok(false);
        };
        if goal.status != GoalStatus::Active {
            debug!("[Scheduler] Goal #{goal_id} is {}; skipping", goal.status.as_str());
            return Ok(false);
        }

        if goal.tasks.is_empty() {
            info!("[Scheduler] Goal #{goal_id} has no tasks; asking the runner to plan it");
            let runner = self.work_runner.clone();
            match self.bounded(runner.plan_goal(&goal)).await {
                Ok(TaskRunOutcome::Failed { error }) => {
                    warn!("[Scheduler] Planning goal #{goal_id} failed: {error}")
                }
                Ok(_) => {}
                Err(reason) => warn!("[Scheduler] Planning goal #{goal_id} failed: {reason}"),
            }
            return Ok(true);
        }

        let Some(task_id) = goal.next_pending_task().map(|t| t.id) else {
            debug!("[Scheduler] Goal #{goal_id} has no pending tasks; skipping");
            return Ok(false);
        };
        self.run_scheduled_task(&goal, task_id).await
    }

    async fn fire_task(&self, task_id: u64) -> Result<bool> {
        let Some(task) = self.with_db(move |db| db.get_task(task_id, None)).await? else {
            warn!("[Scheduler] Task #{task_id} no longer exists; skipping");
            return Ok(false);
        };
        if task.status.is_finished() {
            debug!("[Scheduler] Task #{task_id} is {}; skipping", task.status.as_str());
            return Ok(false);
        }

        let goal_id = task.goal_id;
        let Some(goal) = self.with_db(move |db| db.get_goal(goal_id, None)).await? else {
            warn!("[Scheduler] Goal #{goal_id} of task #{task_id} no longer exists; skipping");
            return Ok(false);
        };
        self.run_scheduled_task(&goal, task_id).await
    }

    /// Claims the task, hands it to the runner and records the outcome.
    async fn run_scheduled_task(&self, goal: &Goal, task_id: u64) -> Result<bool> {
        let Some(task) = self.with_db(move |db| db.claim_task(task_id)).await? else {
            debug!("[Scheduler] Task #{task_id} was finished concurrently; skipping");
            return Ok(false);
        };
        self.publish_task_status(&task).await;
        info!(
            "[Scheduler] Running task #{} '{}' of goal #{}",
            task.id, task.title, goal.id
        );

        let runner = self.work_runner.clone();
        let (status, result) = match self.bounded(runner.run_task(goal, &task)).await {
            Ok(TaskRunOutcome::Dispatched) => {
                info!("[Scheduler] Task #{task_id} dispatched to the agent loop");
                return Ok(true);
            }
            Ok(TaskRunOutcome::Completed { result }) => (TaskStatus::Completed, result),
            Ok(TaskRunOutcome::Failed { error }) => {
                warn!("[Scheduler] Task #{task_id} failed: {error}");
                (TaskStatus::Failed, error)
            }
            Err(reason) => {
                warn!("[Scheduler] Task #{task_id} failed: {reason}");
                (TaskStatus::Failed, reason)
            }
        };

        let task = self
            .with_db(move |db| {
                db.update_task_status(None, task_id, None, status, Some(result.as_str()))
            })
            .await?;
        self.publish_task_status(&task).await;
        Ok(true)
    }

    /// Runs a runner call under the task timeout, turning a timeout or a
    /// panic into an error message.
    async fn bounded<F>(&self, call: F) -> std::result::Result<TaskRunOutcome, String>
    where
        F: std::future::Future<Output = TaskRunOutcome>,
    {
        let limit = self.config.scheduler.task_timeout();
        match time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err("Work runner panicked".to_string()),
            Err(_) => Err(format!("Timed out after {}s", limit.as_secs())),
        }
    }

    /// Whether scheduled work runs. The stored switch wins over
    /// `scheduler.auto_start`.
    pub async fn is_auto_mode_enabled(&self) -> Result<bool> {
        let stored = self.with_db(|db| db.auto_mode()).await?;
        Ok(stored.unwrap_or(self.config.scheduler.auto_start))
    }

    /// Turns auto mode on or off and persists the switch. `scope` is the
    /// conversation that asked; it is announced so adapters can route
    /// milestone notifications there.
    pub async fn set_auto_mode(&self, scope: &Scope, enabled: bool) -> Result<()> {
        self.with_db(move |db| db.set_auto_mode(enabled)).await?;
        info!(
            "[AutoMode] {} from {scope}",
            if enabled { "Enabled" } else { "Disabled" }
        );
        self.events.publish(EngineEvent::AutoModeChanged {
            scope: scope.clone(),
            enabled,
        });
        Ok(())
    }

    /// Starts the tick loop, or returns `None` when the scheduler is
    /// disabled.
    pub fn start_scheduler(&self) -> Option<SchedulerHandle> {
        if !self.config.scheduler.enabled {
            info!("[Scheduler] Disabled by configuration");
            return None;
        }

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let engine = self.clone();
        let period = self.config.scheduler.tick_interval();

        let join = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut consecutive_failures: u32 = 0;
            info!("[Scheduler] Started, ticking every {}s", period.as_secs());

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match engine.run_due_schedules(Timestamp::now()).await {
                    Ok(report) => {
                        if consecutive_failures > 0 {
                            info!("[Scheduler] Tick recovered after {consecutive_failures} failures");
                        }
                        consecutive_failures = 0;
                        if !report.fired.is_empty() {
                            info!(
                                "[Scheduler] Fired {} schedules ({} did work)",
                                report.fired.len(),
                                report.acted
                            );
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!("[Scheduler] Tick failed ({consecutive_failures} in a row): {e}");
                    }
                }
            }

            info!("[Scheduler] Stopped");
        });

        Some(SchedulerHandle { shutdown, join })
    }
}
