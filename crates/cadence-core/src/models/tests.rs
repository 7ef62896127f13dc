#[cfg(test)]
mod model_tests {
    use jiff::Timestamp;

    use crate::{
        models::{
            Goal, GoalStatus, Plan, PlanStatus, PlanStep, PlanTransition, ScheduleEntry,
            ScheduleTarget, StepStatus, Task, TaskStatus,
        },
        scope::Scope,
    };

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_second(seconds).unwrap()
    }

    fn create_test_task(id: u64, order: u32, status: TaskStatus) -> Task {
        Task {
            id,
            goal_id: 1,
            title: format!("Task {id}"),
            description: None,
            status,
            order,
            result: None,
            created_at: ts(1640995200),
            updated_at: ts(1640995200),
        }
    }

    fn create_test_goal(tasks: Vec<Task>) -> Goal {
        Goal {
            id: 1,
            scope: Scope::Global,
            title: "Ship release".to_string(),
            description: None,
            status: GoalStatus::Active,
            created_at: ts(1640995200),
            updated_at: ts(1640995200),
            tasks,
        }
    }

    fn create_test_step(order: u32, status: StepStatus) -> PlanStep {
        PlanStep {
            id: u64::from(order) + 10,
            plan_id: 7,
            tool_name: "echo".to_string(),
            description: format!("step {order}"),
            arguments: serde_json::json!({}),
            order,
            status,
            result: None,
            executed_at: None,
        }
    }

    fn create_test_schedule(max_executions: Option<u32>, execution_count: u32) -> ScheduleEntry {
        ScheduleEntry {
            id: 1,
            scope: Scope::Global,
            target: ScheduleTarget::Goal(1),
            cron_expression: "0 30 9 * * MON-FRI".to_string(),
            enabled: true,
            max_executions,
            execution_count,
            created_at: ts(1640995200),
            updated_at: ts(1640995200),
            last_executed_at: None,
            next_execution_at: Some(ts(1641029400)),
        }
    }

    #[test]
    fn test_goal_transitions() {
        assert!(GoalStatus::Active.can_transition_to(GoalStatus::Paused));
        assert!(GoalStatus::Paused.can_transition_to(GoalStatus::Active));
        assert!(GoalStatus::Paused.can_transition_to(GoalStatus::Completed));
        assert!(GoalStatus::Active.can_transition_to(GoalStatus::Cancelled));

        assert!(!GoalStatus::Completed.can_transition_to(GoalStatus::Active));
        assert!(!GoalStatus::Cancelled.can_transition_to(GoalStatus::Paused));
        assert!(!GoalStatus::Active.can_transition_to(GoalStatus::Active));
        assert!(!GoalStatus::Completed.can_transition_to(GoalStatus::Cancelled));
    }

    #[test]
    fn test_plan_state_machine() {
        use PlanStatus::*;

        assert_eq!(Collecting.apply(PlanTransition::Finalize), Some(Ready));
        assert_eq!(Ready.apply(PlanTransition::Approve), Some(Approved));
        assert_eq!(Approved.apply(PlanTransition::Begin), Some(Executing));
        assert_eq!(
            Executing.apply(PlanTransition::Finish {
                all_steps_done: false
            }),
            Some(PartiallyCompleted)
        );
        assert_eq!(PartiallyCompleted.apply(PlanTransition::Resume), Some(Approved));

        for status in [Collecting, Ready, Approved, Executing, PartiallyCompleted] {
            assert_eq!(status.apply(PlanTransition::Cancel), Some(Cancelled));
        }
        assert_eq!(Completed.apply(PlanTransition::Cancel), None);
        assert_eq!(Cancelled.apply(PlanTransition::Cancel), None);

        assert_eq!(Collecting.apply(PlanTransition::Approve), None);
        assert_eq!(Approved.apply(PlanTransition::Approve), None);
        assert_eq!(Completed.apply(PlanTransition::Resume), None);
        assert_eq!(Ready.apply(PlanTransition::Abandon), None);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            PlanStatus::Collecting,
            PlanStatus::PartiallyCompleted,
            PlanStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<PlanStatus>().unwrap(), status);
        }
        assert_eq!("done".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert_eq!(
            "in_progress".parse::<StepStatus>().unwrap(),
            StepStatus::InProgress
        );
        assert!("bogus".parse::<GoalStatus>().is_err());
    }

    #[test]
    fn test_live_statuses() {
        assert!(PlanStatus::Collecting.is_live());
        assert!(PlanStatus::Executing.is_live());
        assert!(!PlanStatus::PartiallyCompleted.is_live());
        assert!(!PlanStatus::Completed.is_live());
    }

    #[test]
    fn test_goal_next_pending_task_uses_order() {
        let goal = create_test_goal(vec![
            create_test_task(1, 3, TaskStatus::Pending),
            create_test_task(2, 1, TaskStatus::Completed),
            create_test_task(3, 2, TaskStatus::Pending),
        ]);

        assert_eq!(goal.next_pending_task().map(|t| t.id), Some(3));
        assert_eq!(goal.completed_task_count(), 1);
        assert!(!goal.all_tasks_finished());
    }

    #[test]
    fn test_goal_all_tasks_finished() {
        let empty = create_test_goal(Vec::new());
        assert!(!empty.all_tasks_finished());
        assert!(empty.next_pending_task().is_none());

        let done = create_test_goal(vec![
            create_test_task(1, 1, TaskStatus::Completed),
            create_test_task(2, 2, TaskStatus::Skipped),
        ]);
        assert!(done.all_tasks_finished());
    }

    #[test]
    fn test_plan_step_counts() {
        let plan = Plan {
            id: 7,
            scope: Scope::Global,
            title: "Deploy".to_string(),
            description: None,
            status: PlanStatus::PartiallyCompleted,
            model_tier: None,
            created_at: ts(1640995200),
            updated_at: ts(1640995200),
            steps: vec![
                create_test_step(0, StepStatus::Completed),
                create_test_step(1, StepStatus::Failed),
                create_test_step(2, StepStatus::Pending),
            ],
        };

        assert_eq!(plan.completed_step_count(), 1);
        assert_eq!(plan.failed_step_count(), 1);
        assert!(!plan.all_steps_done());
        assert_eq!(plan.next_runnable_step().map(|s| s.order), Some(1));
    }

    #[test]
    fn test_schedule_target_parsing() {
        assert_eq!(
            "goal:12".parse::<ScheduleTarget>().unwrap(),
            ScheduleTarget::Goal(12)
        );
        assert_eq!(
            "Task: 3".parse::<ScheduleTarget>().unwrap(),
            ScheduleTarget::Task(3)
        );
        assert!("plan:1".parse::<ScheduleTarget>().is_err());
        assert!("goal".parse::<ScheduleTarget>().is_err());
        assert_eq!(ScheduleTarget::Task(3).to_string(), "task #3");
    }

    #[test]
    fn test_schedule_due_and_exhaustion() {
        let entry = create_test_schedule(Some(3), 2);
        assert!(!entry.is_exhausted());
        assert!(entry.is_due(ts(1641029400)));
        assert!(!entry.is_due(ts(1641029399)));

        let exhausted = create_test_schedule(Some(3), 3);
        assert!(exhausted.is_exhausted());
        assert!(!exhausted.is_due(ts(1741029400)));

        let unbounded = create_test_schedule(None, 500);
        assert!(!unbounded.is_exhausted());

        let mut disabled = create_test_schedule(None, 0);
        disabled.enabled = false;
        assert!(!disabled.is_due(ts(1741029400)));
    }
}
