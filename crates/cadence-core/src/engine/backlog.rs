//! Goal backlog operations: goals, tasks and the diary.

use log::{debug, info};

use super::{events::EngineEvent, Engine};
use crate::{
    db::goal_queries::GoalRemoval,
    error::{EngineError, EntityKind, Result},
    models::{DiaryEntry, DiaryType, Goal, GoalStatus, Task},
    params::{CreateGoal, NewTask, UpdateTaskStatus},
    scope::Scope,
};

impl Engine {
    /// Creates an Active goal in `scope`.
    ///
    /// Fails with `LimitExceeded` once the scope holds `backlog.max_goals`
    /// Active or Paused goals.
    pub async fn create_goal(&self, scope: &Scope, params: &CreateGoal) -> Result<Goal> {
        params.validate()?;
        let scope = scope.clone();
        let title = params.title.trim().to_string();
        let description = params.description.clone();
        let max_goals = self.config.backlog.max_goals;

        let goal = self
            .with_db(move |db| db.create_goal(&scope, &title, description.as_deref(), max_goals))
            .await?;
        info!("[Backlog] Created goal #{} '{}' in {}", goal.id, goal.title, goal.scope);
        Ok(goal)
    }

    pub async fn get_goal(&self, id: u64, scope: Option<&Scope>) -> Result<Goal> {
        let scope = scope.cloned();
        self.with_db(move |db| db.get_goal(id, scope.as_ref()))
            .await?
            .ok_or(EngineError::not_found(EntityKind::Goal, id))
    }

    /// All goals oldest first.
    pub async fn list_goals(&self, scope: Option<&Scope>) -> Result<Vec<Goal>> {
        let scope = scope.cloned();
        self.with_db(move |db| db.list_goals(scope.as_ref(), None))
            .await
    }

    pub async fn get_active_goals(&self, scope: Option<&Scope>) -> Result<Vec<Goal>> {
        let scope = scope.cloned();
        self.with_db(move |db| db.list_goals(scope.as_ref(), Some(GoalStatus::Active)))
            .await
    }

    pub async fn complete_goal(&self, id: u64, scope: Option<&Scope>) -> Result<Goal> {
        self.transition_goal(id, scope, GoalStatus::Completed).await
    }

    pub async fn pause_goal(&self, id: u64, scope: Option<&Scope>) -> Result<Goal> {
        self.transition_goal(id, scope, GoalStatus::Paused).await
    }

    pub async fn resume_goal(&self, id: u64, scope: Option<&Scope>) -> Result<Goal> {
        self.transition_goal(id, scope, GoalStatus::Active).await
    }

    pub async fn cancel_goal(&self, id: u64, scope: Option<&Scope>) -> Result<Goal> {
        self.transition_goal(id, scope, GoalStatus::Cancelled).await
    }

    async fn transition_goal(
        &self,
        id: u64,
        scope: Option<&Scope>,
        next: GoalStatus,
    ) -> Result<Goal> {
        let scope = scope.cloned();
        let goal = self
            .with_db(move |db| db.transition_goal(id, scope.as_ref(), next))
            .await?;

        info!("[Backlog] Goal #{} '{}' is now {}", goal.id, goal.title, next.as_str());
        self.events.publish(EngineEvent::GoalStatusChanged {
            scope: goal.scope.clone(),
            goal_id: goal.id,
            status: goal.status,
        });
        if next == GoalStatus::Completed {
            self.events.publish(EngineEvent::Milestone {
                scope: goal.scope.clone(),
                message: format!("Goal completed: {}", goal.title),
            });
        }
        Ok(goal)
    }

    /// Deletes a goal with its tasks and every schedule that targets either.
    pub async fn delete_goal(&self, id: u64, scope: Option<&Scope>) -> Result<GoalRemoval> {
        let scope = scope.cloned();
        let removal = self
            .with_db(move |db| db.delete_goal(id, scope.as_ref()))
            .await?;
        info!(
            "[Backlog] Deleted goal #{} '{}' ({} tasks, {} schedules)",
            removal.goal.id,
            removal.goal.title,
            removal.goal.tasks.len(),
            removal.removed_schedules
        );
        Ok(removal)
    }

    /// Removes Completed and Cancelled goals. Returns how many were removed.
    pub async fn clear_completed_goals(&self, scope: Option<&Scope>) -> Result<usize> {
        let scope = scope.cloned();
        let removed = self
            .with_db(move |db| db.clear_finished_goals(scope.as_ref()))
            .await?;
        if removed > 0 {
            info!("[Backlog] Cleared {removed} finished goals");
        }
        Ok(removed)
    }

    /// Appends one task to a goal.
    pub async fn add_task(&self, goal_id: u64, scope: Option<&Scope>, task: NewTask) -> Result<Task> {
        let mut tasks = self.plan_tasks(goal_id, scope, vec![task]).await?;
        tasks
            .pop()
            .ok_or_else(|| EngineError::invalid_state("No task was created"))
    }

    /// Appends several tasks to a goal in one transaction, in the given order.
    pub async fn plan_tasks(
        &self,
        goal_id: u64,
        scope: Option<&Scope>,
        tasks: Vec<NewTask>,
    ) -> Result<Vec<Task>> {
        if tasks.is_empty() {
            return Err(EngineError::invalid_argument("tasks").with_reason("must not be empty"));
        }
        let scope = scope.cloned();
        let max_tasks = self.config.backlog.max_tasks_per_goal;

        let created = self
            .with_db(move |db| db.add_tasks(goal_id, scope.as_ref(), &tasks, max_tasks))
            .await?;
        for task in &created {
            info!(
                "[Backlog] Added task #{} '{}' to goal #{goal_id} at position {}",
                task.id, task.title, task.order
            );
        }
        Ok(created)
    }

    pub async fn get_task(&self, id: u64, scope: Option<&Scope>) -> Result<Task> {
        let scope = scope.cloned();
        self.with_db(move |db| db.get_task(id, scope.as_ref()))
            .await?
            .ok_or(EngineError::not_found(EntityKind::Task, id))
    }

    /// Sets a task's status. Goal status is never changed as a side effect.
    pub async fn update_task_status(
        &self,
        scope: Option<&Scope>,
        params: &UpdateTaskStatus,
    ) -> Result<Task> {
        let status = params.validate()?;
        let scope = scope.cloned();
        let goal_id = params.goal_id;
        let task_id = params.task_id;
        let result = params.result.clone();

        let task = self
            .with_db(move |db| {
                db.update_task_status(goal_id, task_id, scope.as_ref(), status, result.as_deref())
            })
            .await?;
        info!("[Backlog] Task #{} '{}' is now {}", task.id, task.title, status.as_str());
        self.publish_task_status(&task).await;
        Ok(task)
    }

    pub(crate) async fn publish_task_status(&self, task: &Task) {
        let goal_id = task.goal_id;
        match self.with_db(move |db| db.get_goal(goal_id, None)).await {
            Ok(Some(goal)) => self.events.publish(EngineEvent::TaskStatusChanged {
                scope: goal.scope,
                goal_id,
                task_id: task.id,
                status: task.status,
            }),
            Ok(None) => debug!("[Backlog] Goal #{goal_id} vanished before task event"),
            Err(e) => debug!("[Backlog] Could not load goal #{goal_id} for task event: {e}"),
        }
    }

    /// Deletes a task and the schedules targeting it. Returns the task and
    /// the number of removed schedules.
    pub async fn delete_task(&self, task_id: u64, scope: Option<&Scope>) -> Result<(Task, usize)> {
        let scope = scope.cloned();
        let (task, removed) = self
            .with_db(move |db| db.delete_task(task_id, scope.as_ref()))
            .await?;
        info!(
            "[Backlog] Deleted task #{} '{}' ({removed} schedules)",
            task.id, task.title
        );
        Ok((task, removed))
    }

    /// The goal owning a task.
    pub async fn find_goal_for_task(&self, task_id: u64, scope: Option<&Scope>) -> Result<Goal> {
        let task = self.get_task(task_id, scope).await?;
        self.get_goal(task.goal_id, scope).await
    }

    pub async fn completed_task_count(&self, goal_id: u64, scope: Option<&Scope>) -> Result<usize> {
        Ok(self.get_goal(goal_id, scope).await?.completed_task_count())
    }

    /// First Pending task by order across Active goals, oldest goal first.
    pub async fn next_pending_task(&self, scope: Option<&Scope>) -> Result<Option<Task>> {
        let scope = scope.cloned();
        self.with_db(move |db| db.next_pending_task(scope.as_ref(), None))
            .await
    }

    /// First Pending task of one goal, or `None` if the goal is not Active.
    pub async fn next_pending_task_for_goal(
        &self,
        goal_id: u64,
        scope: Option<&Scope>,
    ) -> Result<Option<Task>> {
        // Surface NotFound for unknown or foreign goals.
        self.get_goal(goal_id, scope).await?;
        let scope = scope.cloned();
        self.with_db(move |db| db.next_pending_task(scope.as_ref(), Some(goal_id)))
            .await
    }

    pub async fn write_diary(
        &self,
        scope: &Scope,
        entry_type: DiaryType,
        content: &str,
        goal_id: Option<u64>,
        task_id: Option<u64>,
    ) -> Result<DiaryEntry> {
        let scope = scope.clone();
        let content = content.to_string();
        self.with_db(move |db| db.write_diary(&scope, entry_type, &content, goal_id, task_id))
            .await
    }

    /// The newest `count` entries, oldest first.
    pub async fn recent_diary(&self, scope: Option<&Scope>, count: usize) -> Result<Vec<DiaryEntry>> {
        let scope = scope.cloned();
        self.with_db(move |db| db.recent_diary(scope.as_ref(), count))
            .await
    }
}
