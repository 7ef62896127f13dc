mod common;

use cadence_core::{
    CreateSchedule, EngineError, PlanStatus, Scope, ScheduleTarget, UpdateTaskStatus,
};
use common::create_test_engine;

#[tokio::test]
async fn test_goals_are_isolated_per_conversation() {
    let t = create_test_engine().await;
    let alice = t.engine.for_channel("web", Some("alice")).unwrap();
    let bob = t.engine.for_channel("web", Some("bob")).unwrap();

    let mine = alice.create_goal("Alice's goal", None).await.unwrap();
    let theirs = bob.create_goal("Bob's goal", None).await.unwrap();

    let alice_goals = alice.get_goals().await.unwrap();
    assert_eq!(alice_goals.iter().map(|g| g.id).collect::<Vec<_>>(), vec![mine.id]);
    assert!(bob.get_goals().await.unwrap().iter().all(|g| g.id != mine.id));

    // Foreign ids look exactly like missing ones.
    for result in [
        alice.get_goal(theirs.id).await.map(|_| ()),
        alice.complete_goal(theirs.id).await.map(|_| ()),
        alice.delete_goal(theirs.id).await.map(|_| ()),
        alice.add_task(theirs.id, "Sneaky", None).await.map(|_| ()),
    ] {
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }
    assert_eq!(
        bob.get_goal(theirs.id).await.unwrap().status,
        cadence_core::GoalStatus::Active
    );

    // The unscoped overview sees both.
    let overview = t.engine.dashboard_overview().await.unwrap();
    assert_eq!(overview.goals.len(), 2);
}

#[tokio::test]
async fn test_goal_limit_is_per_scope() {
    let t = create_test_engine().await;
    let alice = t.engine.for_channel("web", Some("alice")).unwrap();
    let bob = t.engine.for_channel("web", Some("bob")).unwrap();

    for i in 0..3 {
        alice.create_goal(&format!("a{i}"), None).await.unwrap();
    }
    assert!(matches!(
        alice.create_goal("a3", None).await,
        Err(EngineError::LimitExceeded { .. })
    ));
    bob.create_goal("b0", None).await.unwrap();
}

#[tokio::test]
async fn test_tasks_and_diary_are_isolated() {
    let t = create_test_engine().await;
    let alice = t.engine.for_channel("web", Some("alice")).unwrap();
    let bob = t.engine.for_channel("web", Some("bob")).unwrap();

    let goal = alice.create_goal("Private", None).await.unwrap();
    let task = alice.add_task(goal.id, "Secret step", None).await.unwrap();

    assert!(matches!(
        bob.get_task(task.id).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        bob.update_task_status(&UpdateTaskStatus {
            goal_id: None,
            task_id: task.id,
            status: "completed".to_string(),
            result: None,
        })
        .await,
        Err(EngineError::NotFound { .. })
    ));
    assert_eq!(bob.next_pending_task().await.unwrap(), None);
    assert_eq!(
        alice.next_pending_task().await.unwrap().map(|t| t.id),
        Some(task.id)
    );

    alice
        .write_diary(cadence_core::DiaryType::Thought, "only for alice", None, None)
        .await
        .unwrap();
    assert!(bob.recent_diary(10).await.unwrap().is_empty());
    assert_eq!(alice.recent_diary(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_schedules_inherit_target_scope() {
    let t = create_test_engine().await;
    let alice = t.engine.for_channel("web", Some("alice")).unwrap();
    let bob = t.engine.for_channel("web", Some("bob")).unwrap();
    let goal = alice.create_goal("Report", None).await.unwrap();

    let request = CreateSchedule {
        target: ScheduleTarget::Goal(goal.id),
        cron_expression: "0 0 8 * * *".to_string(),
        max_executions: None,
    };
    assert!(matches!(
        bob.create_schedule(&request).await,
        Err(EngineError::NotFound { .. })
    ));

    // An unscoped caller may schedule it; the entry still belongs to Alice.
    let entry = t.engine.create_schedule(None, &request).await.unwrap();
    assert_eq!(&entry.scope, alice.scope());
    assert_eq!(alice.get_schedules().await.unwrap().len(), 1);
    assert!(bob.get_schedules().await.unwrap().is_empty());
    assert!(matches!(
        bob.delete_schedule(entry.id).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_plans_are_isolated() {
    let t = create_test_engine().await;
    let alice = t.engine.for_channel("telegram", Some("100")).unwrap();
    let bob = t.engine.for_channel("telegram", Some("200")).unwrap();

    let draft = alice.activate_plan_mode(None).await.unwrap();
    assert!(!bob.is_plan_mode_active().await.unwrap());
    assert!(matches!(
        bob.cancel_plan(draft.id).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(bob.get_plans().await.unwrap().is_empty());
    assert_eq!(
        alice.get_plan(draft.id).await.unwrap().status,
        PlanStatus::Collecting
    );
}

#[tokio::test]
async fn test_unscoped_channels_share_the_global_scope() {
    let t = create_test_engine().await;
    let cli = t.engine.for_channel("cli", None).unwrap();
    let also_cli = t.engine.for_channel("cli", Some("ignored")).unwrap();
    assert_eq!(cli.scope(), &Scope::Global);

    let goal = cli.create_goal("Shared", None).await.unwrap();
    assert_eq!(also_cli.get_goal(goal.id).await.unwrap().title, "Shared");
}
