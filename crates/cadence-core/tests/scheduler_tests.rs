mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{
    CreateSchedule, EngineBuilder, EngineConfig, EngineError, FrequencySchedule, Goal, GoalStatus,
    Scope, ScheduleTarget, Task, TaskRunOutcome, TaskStatus, UpdateTaskStatus, WorkRunner,
};
use common::{create_test_engine, create_test_engine_with};
use jiff::{civil::Weekday, tz::TimeZone, SignedDuration};
use tempfile::TempDir;
use tokio::sync::Notify;

fn schedule(target: ScheduleTarget, cron: &str, max: Option<u32>) -> CreateSchedule {
    CreateSchedule {
        target,
        cron_expression: cron.to_string(),
        max_executions: max,
    }
}

#[tokio::test]
async fn test_bounded_weekday_schedule_exhausts() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Standup notes", None).await.unwrap();
    for title in ["Mon notes", "Tue notes", "Wed notes", "Thu notes"] {
        chat.add_task(goal.id, title, None).await.unwrap();
    }

    let entry = chat
        .create_schedule(&schedule(
            ScheduleTarget::Goal(goal.id),
            "0 30 9 * * MON-FRI",
            Some(3),
        ))
        .await
        .unwrap();
    assert!(entry.enabled);

    let mut fire_times = Vec::new();
    for _ in 0..3 {
        let entry = chat.get_schedule(entry.id).await.unwrap();
        let due = entry.next_execution_at.expect("enabled entry has a next run");
        let report = t.engine.run_due_schedules(due).await.unwrap();
        assert_eq!(report.fired, vec![entry.id]);
        assert_eq!(report.acted, 1);
        fire_times.push(due);
    }

    for due in &fire_times {
        let zoned = due.to_zoned(TimeZone::UTC);
        assert!(!matches!(zoned.weekday(), Weekday::Saturday | Weekday::Sunday));
        assert_eq!((zoned.hour(), zoned.minute()), (9, 30));
    }
    assert!(fire_times.windows(2).all(|w| w[0] < w[1]));

    let entry = chat.get_schedule(entry.id).await.unwrap();
    assert_eq!(entry.execution_count, 3);
    assert!(!entry.enabled);
    assert_eq!(entry.next_execution_at, None);

    // Far in the future, nothing is due any more.
    let later = fire_times[2]
        .checked_add(SignedDuration::from_hours(24 * 30))
        .unwrap();
    let report = t.engine.run_due_schedules(later).await.unwrap();
    assert!(report.fired.is_empty());

    // Three tasks ran in order, the fourth is still pending.
    let goal = chat.get_goal(goal.id).await.unwrap();
    let statuses: Vec<TaskStatus> = goal.tasks.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Completed,
            TaskStatus::Completed,
            TaskStatus::Completed,
            TaskStatus::Pending
        ]
    );
    let expected: Vec<u64> = goal.tasks[..3].iter().map(|t| t.id).collect();
    assert_eq!(t.runner.task_calls(), expected);
}

#[tokio::test]
async fn test_missed_occurrences_fire_once() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Hourly", None).await.unwrap();
    chat.add_task(goal.id, "Check", None).await.unwrap();

    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 * * * *", None))
        .await
        .unwrap();
    let first = entry.next_execution_at.unwrap();
    let much_later = first
        .checked_add(SignedDuration::from_hours(10))
        .unwrap();

    let report = t.engine.run_due_schedules(much_later).await.unwrap();
    assert_eq!(report.fired, vec![entry.id]);

    let entry = chat.get_schedule(entry.id).await.unwrap();
    assert_eq!(entry.execution_count, 1);
    assert!(entry.next_execution_at.unwrap() > much_later);
    assert!(entry.enabled);
}

#[tokio::test]
async fn test_inactive_goal_is_skipped_but_recorded() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Paused work", None).await.unwrap();
    chat.add_task(goal.id, "Wait", None).await.unwrap();
    chat.pause_goal(goal.id).await.unwrap();

    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 8 * * *", Some(5)))
        .await
        .unwrap();
    let report = t
        .engine
        .run_due_schedules(entry.next_execution_at.unwrap())
        .await
        .unwrap();

    assert_eq!(report.fired, vec![entry.id]);
    assert_eq!(report.acted, 0);
    assert!(t.runner.task_calls().is_empty());
    assert_eq!(chat.get_schedule(entry.id).await.unwrap().execution_count, 1);
    assert_eq!(chat.get_goal(goal.id).await.unwrap().status, GoalStatus::Paused);
}

#[tokio::test]
async fn test_goal_without_tasks_is_handed_to_planner() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Fresh idea", None).await.unwrap();

    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 8 * * *", None))
        .await
        .unwrap();
    let report = t
        .engine
        .run_due_schedules(entry.next_execution_at.unwrap())
        .await
        .unwrap();

    assert_eq!(report.acted, 1);
    assert_eq!(t.runner.goal_calls(), vec![goal.id]);
}

#[tokio::test]
async fn test_task_trigger_records_runner_outcome() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Nightly", None).await.unwrap();
    let task = chat.add_task(goal.id, "Back up", None).await.unwrap();
    *t.runner.outcome.lock().unwrap() = TaskRunOutcome::Failed {
        error: "disk full".to_string(),
    };

    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Task(task.id), "0 0 2 * * *", None))
        .await
        .unwrap();
    let due = entry.next_execution_at.unwrap();
    t.engine.run_due_schedules(due).await.unwrap();

    let task = chat.get_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.result.as_deref(), Some("disk full"));

    // A failed task is retried on the next occurrence; a dispatched one
    // stays in progress.
    *t.runner.outcome.lock().unwrap() = TaskRunOutcome::Dispatched;
    let next = chat.get_schedule(entry.id).await.unwrap().next_execution_at.unwrap();
    let report = t.engine.run_due_schedules(next).await.unwrap();
    assert_eq!(report.acted, 1);
    assert_eq!(
        chat.get_task(task.id).await.unwrap().status,
        TaskStatus::InProgress
    );
}

#[tokio::test]
async fn test_deleting_goal_removes_its_schedules() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Temporary", None).await.unwrap();
    let task = chat.add_task(goal.id, "Step", None).await.unwrap();

    chat.create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 8 * * *", None))
        .await
        .unwrap();
    chat.create_schedule(&schedule(ScheduleTarget::Task(task.id), "0 0 9 * * *", None))
        .await
        .unwrap();
    assert_eq!(
        chat.find_schedules_for_target(ScheduleTarget::Goal(goal.id))
            .await
            .unwrap()
            .len(),
        1
    );

    let removal = chat.delete_goal(goal.id).await.unwrap();
    assert_eq!(removal.removed_schedules, 2);
    assert!(chat.get_schedules().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_schedule_validation() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Validated", None).await.unwrap();

    for bad in ["not a cron", "0 61 9 * * *", "* * *"] {
        let err = chat
            .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), bad, None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }), "{bad}");
    }

    let err = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 8 * * *", Some(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument { .. }));

    let err = chat
        .create_schedule(&schedule(ScheduleTarget::Task(999), "0 0 8 * * *", None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_frequency_schedule() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Weekly review", None).await.unwrap();

    let entry = chat
        .create_schedule_from_frequency(&FrequencySchedule {
            target: ScheduleTarget::Goal(goal.id),
            frequency: "custom".to_string(),
            days: vec![1, 3, 5],
            time: "0745".to_string(),
            max_executions: Some(0),
        })
        .await
        .unwrap();
    assert_eq!(entry.cron_expression, "0 45 7 * * MON,WED,FRI");
    assert_eq!(entry.max_executions, None);
}

/// Runner that holds every task until released.
struct GatedRunner {
    gate: Arc<Notify>,
}

#[async_trait]
impl WorkRunner for GatedRunner {
    async fn run_task(&self, _goal: &Goal, _task: &Task) -> TaskRunOutcome {
        self.gate.notified().await;
        TaskRunOutcome::Completed {
            result: "released".to_string(),
        }
    }

    async fn plan_goal(&self, _goal: &Goal) -> TaskRunOutcome {
        TaskRunOutcome::Dispatched
    }
}

#[tokio::test]
async fn test_overlapping_tick_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let gate = Arc::new(Notify::new());
    let engine = EngineBuilder::new()
        .with_database_path(Some(temp_dir.path().join("test.db")))
        .with_work_runner(Arc::new(GatedRunner { gate: gate.clone() }))
        .build()
        .await
        .unwrap();
    let chat = engine.scoped(Scope::Global);
    let goal = chat.create_goal("Slow", None).await.unwrap();
    let task = chat.add_task(goal.id, "Slow task", None).await.unwrap();
    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 8 * * *", None))
        .await
        .unwrap();
    let due = entry.next_execution_at.unwrap();

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_due_schedules(due).await }
    });

    for _ in 0..200 {
        if chat.get_task(task.id).await.unwrap().status == TaskStatus::InProgress {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let overlapped = engine.run_due_schedules(due).await.unwrap();
    assert!(overlapped.overlapped);
    assert!(overlapped.fired.is_empty());

    gate.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.fired, vec![entry.id]);
    assert!(!report.overlapped);
    assert_eq!(
        chat.get_task(task.id).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_scheduler_loop_starts_and_stops() {
    let t = create_test_engine().await;
    let handle = t.engine.start_scheduler().expect("scheduler is enabled");
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_auto_mode_off_pauses_ticks_across_restart() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Inbox zero", None).await.unwrap();
    chat.add_task(goal.id, "Triage", None).await.unwrap();
    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 7 * * *", None))
        .await
        .unwrap();
    let due = entry.next_execution_at.unwrap();

    assert!(chat.is_auto_mode_enabled().await.unwrap());
    chat.set_auto_mode(false).await.unwrap();

    let restarted = t.reopen().await;
    assert!(!restarted.is_auto_mode_enabled().await.unwrap());
    let report = restarted.run_due_schedules(due).await.unwrap();
    assert!(report.paused);
    assert!(report.fired.is_empty());
    assert!(t.runner.task_calls().is_empty());
    assert_eq!(chat.get_schedule(entry.id).await.unwrap().execution_count, 0);

    restarted.set_auto_mode(&Scope::Global, true).await.unwrap();
    let report = restarted.run_due_schedules(due).await.unwrap();
    assert!(!report.paused);
    assert_eq!(report.fired, vec![entry.id]);
    assert_eq!(t.runner.task_calls().len(), 1);
}

#[tokio::test]
async fn test_auto_start_off_waits_for_switch() {
    let mut config = EngineConfig::default();
    config.scheduler.auto_start = false;
    let t = create_test_engine_with(config).await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Weekly review", None).await.unwrap();
    chat.add_task(goal.id, "Collect notes", None).await.unwrap();
    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 17 * * FRI", None))
        .await
        .unwrap();
    let due = entry.next_execution_at.unwrap();

    assert!(t.engine.run_due_schedules(due).await.unwrap().paused);

    chat.set_auto_mode(true).await.unwrap();
    let report = t.engine.run_due_schedules(due).await.unwrap();
    assert_eq!(report.fired, vec![entry.id]);
}

#[tokio::test]
async fn test_goal_trigger_passes_over_failed_task() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Release", None).await.unwrap();
    let broken = chat.add_task(goal.id, "Sign binaries", None).await.unwrap();
    let next = chat.add_task(goal.id, "Write notes", None).await.unwrap();
    chat.update_task_status(&UpdateTaskStatus {
        goal_id: None,
        task_id: broken.id,
        status: "failed".to_string(),
        result: Some("key expired".to_string()),
    })
    .await
    .unwrap();

    let entry = chat
        .create_schedule(&schedule(ScheduleTarget::Goal(goal.id), "0 0 9 * * *", None))
        .await
        .unwrap();
    t.engine
        .run_due_schedules(entry.next_execution_at.unwrap())
        .await
        .unwrap();

    // Goal triggers only pick Pending tasks; a Failed one needs its own
    // task schedule or a manual status change to run again.
    assert_eq!(t.runner.task_calls(), vec![next.id]);
    assert_eq!(
        chat.get_task(broken.id).await.unwrap().status,
        TaskStatus::Failed
    );
}
