//! The engine bound to one conversation.

use super::{events::PlanAction, Engine};
use crate::{
    db::goal_queries::GoalRemoval,
    error::Result,
    models::{DiaryEntry, DiaryType, Goal, Plan, PlanStatus, PlanStep, ScheduleEntry, ScheduleTarget, Task},
    params::{AddStep, CreateGoal, CreateSchedule, FrequencySchedule, NewTask, UpdateTaskStatus},
    scope::Scope,
};

/// Engine view whose every lookup is filtered to one scope and whose every
/// creation is tagged with it.
#[derive(Clone)]
pub struct ScopedEngine {
    engine: Engine,
    scope: Scope,
}

impl ScopedEngine {
    pub(crate) fn new(engine: Engine, scope: Scope) -> Self {
        Self { engine, scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn filter(&self) -> Option<&Scope> {
        Some(&self.scope)
    }

    // Backlog

    pub async fn create_goal(&self, title: &str, description: Option<&str>) -> Result<Goal> {
        let params = CreateGoal {
            title: title.to_string(),
            description: description.map(String::from),
        };
        self.engine.create_goal(&self.scope, &params).await
    }

    pub async fn get_goal(&self, id: u64) -> Result<Goal> {
        self.engine.get_goal(id, self.filter()).await
    }

    pub async fn get_goals(&self) -> Result<Vec<Goal>> {
        self.engine.list_goals(self.filter()).await
    }

    pub async fn get_active_goals(&self) -> Result<Vec<Goal>> {
        self.engine.get_active_goals(self.filter()).await
    }

    pub async fn complete_goal(&self, id: u64) -> Result<Goal> {
        self.engine.complete_goal(id, self.filter()).await
    }

    pub async fn pause_goal(&self, id: u64) -> Result<Goal> {
        self.engine.pause_goal(id, self.filter()).await
    }

    pub async fn resume_goal(&self, id: u64) -> Result<Goal> {
        self.engine.resume_goal(id, self.filter()).await
    }

    pub async fn cancel_goal(&self, id: u64) -> Result<Goal> {
        self.engine.cancel_goal(id, self.filter()).await
    }

    pub async fn delete_goal(&self, id: u64) -> Result<GoalRemoval> {
        self.engine.delete_goal(id, self.filter()).await
    }

    pub async fn clear_completed_goals(&self) -> Result<usize> {
        self.engine.clear_completed_goals(self.filter()).await
    }

    pub async fn add_task(
        &self,
        goal_id: u64,
        title: &str,
        description: Option<&str>,
    ) -> Result<Task> {
        let task = NewTask {
            title: title.to_string(),
            description: description.map(String::from),
            order: None,
        };
        self.engine.add_task(goal_id, self.filter(), task).await
    }

    pub async fn add_task_at(&self, goal_id: u64, task: NewTask) -> Result<Task> {
        self.engine.add_task(goal_id, self.filter(), task).await
    }

    pub async fn plan_tasks(&self, goal_id: u64, tasks: Vec<NewTask>) -> Result<Vec<Task>> {
        self.engine.plan_tasks(goal_id, self.filter(), tasks).await
    }

    pub async fn get_task(&self, id: u64) -> Result<Task> {
        self.engine.get_task(id, self.filter()).await
    }

    pub async fn update_task_status(&self, params: &UpdateTaskStatus) -> Result<Task> {
        self.engine.update_task_status(self.filter(), params).await
    }

    pub async fn delete_task(&self, id: u64) -> Result<(Task, usize)> {
        self.engine.delete_task(id, self.filter()).await
    }

    pub async fn find_goal_for_task(&self, task_id: u64) -> Result<Goal> {
        self.engine.find_goal_for_task(task_id, self.filter()).await
    }

    pub async fn completed_task_count(&self, goal_id: u64) -> Result<usize> {
        self.engine.completed_task_count(goal_id, self.filter()).await
    }

    pub async fn next_pending_task(&self) -> Result<Option<Task>> {
        self.engine.next_pending_task(self.filter()).await
    }

    pub async fn next_pending_task_for_goal(&self, goal_id: u64) -> Result<Option<Task>> {
        self.engine
            .next_pending_task_for_goal(goal_id, self.filter())
            .await
    }

    pub async fn write_diary(
        &self,
        entry_type: DiaryType,
        content: &str,
        goal_id: Option<u64>,
        task_id: Option<u64>,
    ) -> Result<DiaryEntry> {
        self.engine
            .write_diary(&self.scope, entry_type, content, goal_id, task_id)
            .await
    }

    pub async fn recent_diary(&self, count: usize) -> Result<Vec<DiaryEntry>> {
        self.engine.recent_diary(self.filter(), count).await
    }

    // Plans

    pub async fn activate_plan_mode(&self, model_tier: Option<&str>) -> Result<Plan> {
        self.engine.activate_plan_mode(&self.scope, model_tier).await
    }

    pub async fn deactivate_plan_mode(&self) -> Result<Option<Plan>> {
        self.engine.deactivate_plan_mode(&self.scope).await
    }

    pub async fn is_plan_mode_active(&self) -> Result<bool> {
        self.engine.is_plan_mode_active(&self.scope).await
    }

    pub async fn live_plan(&self) -> Result<Option<Plan>> {
        self.engine.live_plan(&self.scope).await
    }

    pub async fn add_step(&self, params: &AddStep) -> Result<PlanStep> {
        self.engine.add_step(&self.scope, params).await
    }

    pub async fn finalize_plan(&self, title: Option<&str>, description: Option<&str>) -> Result<Plan> {
        self.engine.finalize_plan(&self.scope, title, description).await
    }

    pub async fn approve_plan(&self, id: u64) -> Result<Plan> {
        self.engine.approve_plan(id, self.filter()).await
    }

    pub async fn cancel_plan(&self, id: u64) -> Result<Plan> {
        self.engine.cancel_plan(id, self.filter()).await
    }

    pub async fn resume_plan(&self, id: u64) -> Result<Plan> {
        self.engine.resume_plan(id, self.filter()).await
    }

    pub async fn skip_step(&self, plan_id: u64, step_id: u64) -> Result<PlanStep> {
        self.engine.skip_step(plan_id, step_id, self.filter()).await
    }

    pub async fn handle_approval_callback(&self, plan_id: u64, action: PlanAction) -> Result<Plan> {
        self.engine
            .handle_approval_callback(plan_id, action, self.filter())
            .await
    }

    pub async fn get_plan(&self, id: u64) -> Result<Plan> {
        self.engine.get_plan(id, self.filter()).await
    }

    pub async fn get_plans(&self) -> Result<Vec<Plan>> {
        self.engine.list_plans(self.filter()).await
    }

    pub async fn latest_plan(&self, statuses: &[PlanStatus]) -> Result<Option<Plan>> {
        self.engine.latest_plan(self.filter(), statuses).await
    }

    pub async fn delete_plan(&self, id: u64) -> Result<Plan> {
        self.engine.delete_plan(id, self.filter()).await
    }

    // Schedules

    pub async fn create_schedule(&self, params: &CreateSchedule) -> Result<ScheduleEntry> {
        self.engine.create_schedule(self.filter(), params).await
    }

    pub async fn create_schedule_from_frequency(
        &self,
        params: &FrequencySchedule,
    ) -> Result<ScheduleEntry> {
        self.engine
            .create_schedule_from_frequency(self.filter(), params)
            .await
    }

    pub async fn get_schedule(&self, id: u64) -> Result<ScheduleEntry> {
        self.engine.get_schedule(id, self.filter()).await
    }

    pub async fn get_schedules(&self) -> Result<Vec<ScheduleEntry>> {
        self.engine.list_schedules(self.filter()).await
    }

    pub async fn find_schedules_for_target(&self, target: ScheduleTarget) -> Result<Vec<ScheduleEntry>> {
        self.engine.schedules_for_target(target, self.filter()).await
    }

    pub async fn delete_schedule(&self, id: u64) -> Result<ScheduleEntry> {
        self.engine.delete_schedule(id, self.filter()).await
    }

    // Auto mode

    pub async fn is_auto_mode_enabled(&self) -> Result<bool> {
        self.engine.is_auto_mode_enabled().await
    }

    pub async fn set_auto_mode(&self, enabled: bool) -> Result<()> {
        self.engine.set_auto_mode(&self.scope, enabled).await
    }
}
