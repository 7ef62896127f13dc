mod common;

use cadence_core::{
    CreateGoal, DiaryType, EngineConfig, EngineError, GoalStatus, NewTask, Scope, TaskStatus,
    UpdateTaskStatus,
};
use common::{create_test_engine, create_test_engine_with};

fn status(task_id: u64, status: &str) -> UpdateTaskStatus {
    UpdateTaskStatus {
        goal_id: None,
        task_id,
        status: status.to_string(),
        result: None,
    }
}

#[tokio::test]
async fn test_ship_release_workflow() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);

    let goal = chat.create_goal("Ship release", None).await.unwrap();
    assert_eq!(goal.status, GoalStatus::Active);

    let t1 = chat.add_task(goal.id, "Tag the release", None).await.unwrap();
    let t2 = chat.add_task(goal.id, "Publish notes", None).await.unwrap();
    assert_eq!((t1.order, t2.order), (1, 2));

    chat.update_task_status(&status(t1.id, "completed")).await.unwrap();
    let next = chat.next_pending_task_for_goal(goal.id).await.unwrap();
    assert_eq!(next.map(|t| t.id), Some(t2.id));

    chat.update_task_status(&status(t2.id, "completed")).await.unwrap();
    assert_eq!(chat.next_pending_task_for_goal(goal.id).await.unwrap(), None);

    // Finishing every task leaves the goal Active.
    let goal = chat.get_goal(goal.id).await.unwrap();
    assert_eq!(goal.status, GoalStatus::Active);
    assert_eq!(goal.completed_task_count(), 2);

    let goal = chat.complete_goal(goal.id).await.unwrap();
    assert_eq!(goal.status, GoalStatus::Completed);

    let diary = chat.recent_diary(10).await.unwrap();
    assert!(diary.iter().all(|e| e.entry_type == DiaryType::Progress));
    assert_eq!(diary.len(), 3);
}

#[tokio::test]
async fn test_goal_limit_counts_open_goals_only() {
    let mut config = EngineConfig::default();
    config.backlog.max_goals = 2;
    let t = create_test_engine_with(config).await;
    let chat = t.engine.scoped(Scope::Global);

    let first = chat.create_goal("One", None).await.unwrap();
    chat.create_goal("Two", None).await.unwrap();
    let err = chat.create_goal("Three", None).await.unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded { limit: 2, .. }));

    chat.cancel_goal(first.id).await.unwrap();
    chat.create_goal("Three", None).await.unwrap();
}

#[tokio::test]
async fn test_goal_transitions_are_guarded() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Guarded", None).await.unwrap();

    chat.pause_goal(goal.id).await.unwrap();
    assert!(matches!(
        chat.pause_goal(goal.id).await,
        Err(EngineError::InvalidState { .. })
    ));
    chat.resume_goal(goal.id).await.unwrap();
    chat.complete_goal(goal.id).await.unwrap();

    for result in [
        chat.resume_goal(goal.id).await,
        chat.cancel_goal(goal.id).await,
    ] {
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
    }
    assert!(matches!(
        chat.add_task(goal.id, "Too late", None).await,
        Err(EngineError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_task_order_and_limits() {
    let mut config = EngineConfig::default();
    config.backlog.max_tasks_per_goal = 3;
    let t = create_test_engine_with(config).await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Ordered", None).await.unwrap();

    let tasks = chat
        .plan_tasks(
            goal.id,
            vec![
                NewTask {
                    order: Some(5),
                    ..NewTask::titled("Late")
                },
                NewTask::titled("After late"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(tasks[0].order, 5);
    assert_eq!(tasks[1].order, 6);

    let dup = chat
        .add_task_at(
            goal.id,
            NewTask {
                order: Some(5),
                ..NewTask::titled("Duplicate")
            },
        )
        .await;
    assert!(matches!(dup, Err(EngineError::Conflict { .. })));

    chat.add_task(goal.id, "Third", None).await.unwrap();
    assert!(matches!(
        chat.add_task(goal.id, "Fourth", None).await,
        Err(EngineError::LimitExceeded { limit: 3, .. })
    ));

    // A batch over the limit adds nothing.
    let goal2 = chat.create_goal("Batch", None).await.unwrap();
    let batch = (0..4).map(|i| NewTask::titled(format!("t{i}"))).collect();
    assert!(chat.plan_tasks(goal2.id, batch).await.is_err());
    assert!(chat.get_goal(goal2.id).await.unwrap().tasks.is_empty());
}

#[tokio::test]
async fn test_update_task_status_validation() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);
    let goal = chat.create_goal("Validate", None).await.unwrap();
    let other = chat.create_goal("Other", None).await.unwrap();
    let task = chat.add_task(goal.id, "Only", None).await.unwrap();

    let err = chat
        .update_task_status(&status(task.id, "finished"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid status: finished"));

    let err = chat
        .update_task_status(&UpdateTaskStatus {
            goal_id: Some(other.id),
            ..status(task.id, "completed")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    let task = chat
        .update_task_status(&UpdateTaskStatus {
            result: Some("all good".to_string()),
            ..status(task.id, "failed")
        })
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.result.as_deref(), Some("all good"));
}

#[tokio::test]
async fn test_next_pending_task_skips_inactive_goals() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);

    let paused = chat.create_goal("Paused", None).await.unwrap();
    chat.add_task(paused.id, "Hidden", None).await.unwrap();
    chat.pause_goal(paused.id).await.unwrap();

    let active = chat.create_goal("Active", None).await.unwrap();
    let visible = chat.add_task(active.id, "Visible", None).await.unwrap();

    let next = chat.next_pending_task().await.unwrap().unwrap();
    assert_eq!(next.id, visible.id);
    assert_eq!(chat.next_pending_task_for_goal(paused.id).await.unwrap(), None);
    assert_eq!(chat.find_goal_for_task(visible.id).await.unwrap().id, active.id);
}

#[tokio::test]
async fn test_delete_goal_and_clear_finished() {
    let t = create_test_engine().await;
    let chat = t.engine.scoped(Scope::Global);

    let keep = chat.create_goal("Keep", None).await.unwrap();
    let done = chat.create_goal("Done", None).await.unwrap();
    chat.add_task(done.id, "Finished work", None).await.unwrap();
    chat.complete_goal(done.id).await.unwrap();

    assert_eq!(chat.clear_completed_goals().await.unwrap(), 1);
    let goals = chat.get_goals().await.unwrap();
    assert_eq!(goals.iter().map(|g| g.id).collect::<Vec<_>>(), vec![keep.id]);

    let removal = chat.delete_goal(keep.id).await.unwrap();
    assert_eq!(removal.goal.id, keep.id);
    assert!(matches!(
        chat.get_goal(keep.id).await,
        Err(EngineError::NotFound { .. })
    ));

    let diary = chat.recent_diary(50).await.unwrap();
    assert_eq!(diary.last().unwrap().entry_type, DiaryType::Decision);
}

#[tokio::test]
async fn test_diary_returns_newest_oldest_first() {
    let t = create_test_engine().await;
    let scope = Scope::Global;

    for i in 1..=5 {
        t.engine
            .write_diary(&scope, DiaryType::Thought, &format!("note {i}"), None, None)
            .await
            .unwrap();
    }
    let entries = t.engine.recent_diary(Some(&scope), 3).await.unwrap();
    let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["note 3", "note 4", "note 5"]);
}

#[tokio::test]
async fn test_create_goal_rejects_blank_title() {
    let t = create_test_engine().await;
    let err = t
        .engine
        .create_goal(
            &Scope::Global,
            &CreateGoal {
                title: "   ".to_string(),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument { .. }));
}
