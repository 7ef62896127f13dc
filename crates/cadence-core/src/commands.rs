//! Text command surface consumed from channel adapters.
//!
//! [`CommandRouter`] parses one line of user input (`plan approve 4`,
//! `schedule goal 1 weekdays 09:30 3`, ...) and runs it against a
//! [`ScopedEngine`]. Replies are markdown [`CommandResult`]s; engine errors
//! become failure results and are never propagated to the adapter.

use log::debug;

use crate::{
    cron::parse_schedule_args,
    display::{CommandResult, DiaryEntries, ExecutionSummary, Goals, Plans, Schedules, TaskBoard, UtcDateTime},
    engine::ScopedEngine,
    error::{EngineError, Result},
    models::{PlanStatus, ScheduleTarget},
    params::{AddStep, CreateSchedule, UpdateTaskStatus},
};

const DEFAULT_DIARY_COUNT: usize = 10;
const MAX_DIARY_COUNT: usize = 50;

const HELP: &str = "\
**Commands**

- `plan [on [tier]|off|add <tool> [description]|done [title]|approve [id]|cancel [id]|resume [id]|status [id]]`
- `plans`: list plans
- `goal <description>`: create a goal
- `goals [complete|pause|resume|cancel|delete <id>|clear]`
- `tasks [add <goalId> <title>|done <taskId> [result]|fail <taskId> [reason]|skip <taskId>|delete <taskId>]`
- `diary [count]`: recent diary entries
- `schedule goal|task <id> <cron-or-frequency> [repeat]`, `schedule list`, `schedule delete <id>`, `schedule help`
- `auto [on|off]`: show or switch whether schedules run
";

const SCHEDULE_HELP: &str = "\
**Scheduling**

- `schedule goal <goalId> <when> [repeat]`
- `schedule task <taskId> <when> [repeat]`
- `schedule list`
- `schedule delete <scheduleId>`

`<when>` is either a cron expression (`0 30 9 * * MON-FRI`; five fields get a `0` seconds field) \
or a frequency:

- `daily 09:30`
- `weekdays 0930`
- `weekly 1,3,5 18:00`
- `custom mon,thu 07:15`

Times are UTC. Days are 1 (Monday) through 7 (Sunday). A trailing number after a \
cron expression or a frequency is the repeat count; without it the schedule repeats forever. \
Six words that form a valid six-field cron expression are read as one.
";

/// Parses and runs commands for one conversation.
#[derive(Clone)]
pub struct CommandRouter {
    chat: ScopedEngine,
}

fn parse_id(field: &str, word: Option<&&str>) -> Result<u64> {
    let Some(word) = word else {
        return Err(EngineError::invalid_argument(field).with_reason("an id is required"));
    };
    word.trim_start_matches('#')
        .parse::<u64>()
        .map_err(|_| EngineError::invalid_argument(field).with_reason(format!("'{word}' is not an id")))
}

fn parse_optional_id(field: &str, word: Option<&&str>) -> Result<Option<u64>> {
    match word {
        Some(_) => parse_id(field, word).map(Some),
        None => Ok(None),
    }
}

fn rest(args: &[&str], from: usize) -> Option<String> {
    let text = args.get(from..).unwrap_or_default().join(" ");
    (!text.is_empty()).then_some(text)
}

impl CommandRouter {
    pub fn new(chat: ScopedEngine) -> Self {
        Self { chat }
    }

    pub fn session(&self) -> &ScopedEngine {
        &self.chat
    }

    /// Runs one line of input. A leading `/` is accepted.
    pub async fn dispatch(&self, line: &str) -> CommandResult {
        let line = line.trim();
        let line = line.strip_prefix('/').unwrap_or(line);
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = words.split_first() else {
            return CommandResult::failure("Empty command. Type `help` for the command list.");
        };

        debug!("[Commands] {} in {}: {line}", command, self.chat.scope());
        let outcome = match command.to_lowercase().as_str() {
            "plan" => self.plan(args).await,
            "plans" => self.plans().await,
            "goal" => self.goal(args).await,
            "goals" => self.goals(args).await,
            "tasks" => self.tasks(args).await,
            "diary" => self.diary(args).await,
            "schedule" => self.schedule(args).await,
            "auto" => self.auto(args).await,
            "help" => Ok(CommandResult::success(HELP)),
            other => Ok(CommandResult::failure(format!(
                "Unknown command: {other}. Type `help` for the command list."
            ))),
        };
        outcome.unwrap_or_else(CommandResult::from)
    }

    async fn plan(&self, args: &[&str]) -> Result<CommandResult> {
        let Some(sub) = args.first() else {
            return self.plan_status(None).await;
        };

        match sub.to_lowercase().as_str() {
            "on" => {
                let plan = self.chat.activate_plan_mode(args.get(1).copied()).await?;
                Ok(CommandResult::success(format!(
                    "Plan mode ON (plan #{}). Add steps with `plan add <tool> [description]` \
                     and finish with `plan done [title]`.",
                    plan.id
                )))
            }
            "off" => Ok(match self.chat.deactivate_plan_mode().await? {
                Some(plan) => CommandResult::success(format!(
                    "Plan mode OFF. Draft plan #{} discarded.",
                    plan.id
                )),
                None => CommandResult::success("Plan mode is not active."),
            }),
            "add" => {
                let Some(tool) = args.get(1) else {
                    return Ok(CommandResult::failure("Usage: plan add <tool> [description]"));
                };
                let description = rest(args, 2).unwrap_or_else(|| tool.to_string());
                let params = AddStep {
                    tool_name: tool.to_string(),
                    arguments: serde_json::json!({ "input": description }),
                    description,
                };
                let step = self.chat.add_step(&params).await?;
                Ok(CommandResult::success(format!(
                    "Step {} added to plan #{}: `{}` {}",
                    step.order + 1,
                    step.plan_id,
                    step.tool_name,
                    step.description
                )))
            }
            "done" => {
                let title = rest(args, 1);
                let plan = self.chat.finalize_plan(title.as_deref(), None).await?;
                Ok(CommandResult::success(format!(
                    "{plan}\nApprove with `plan approve {id}` or discard with `plan cancel {id}`.",
                    id = plan.id
                )))
            }
            "approve" => {
                let id = match parse_optional_id("id", args.get(1))? {
                    Some(id) => id,
                    None => match self.chat.latest_plan(&[PlanStatus::Ready]).await? {
                        Some(plan) => plan.id,
                        None => return Ok(CommandResult::failure("No plan is waiting for approval.")),
                    },
                };
                let plan = self.chat.approve_plan(id).await?;
                Ok(CommandResult::success(format!(
                    "Plan #{} approved. Executing {} steps...",
                    plan.id,
                    plan.steps.len()
                )))
            }
            "cancel" => {
                let id = match parse_optional_id("id", args.get(1))? {
                    Some(id) => id,
                    None => match self.default_cancel_target().await? {
                        Some(id) => id,
                        None => return Ok(CommandResult::failure("No plan to cancel.")),
                    },
                };
                let plan = self.chat.cancel_plan(id).await?;
                Ok(CommandResult::success(format!("Plan #{} cancelled.", plan.id)))
            }
            "resume" => {
                let id = match parse_optional_id("id", args.get(1))? {
                    Some(id) => id,
                    None => match self.chat.latest_plan(&[PlanStatus::PartiallyCompleted]).await? {
                        Some(plan) => plan.id,
                        None => return Ok(CommandResult::failure("No partially completed plan to resume.")),
                    },
                };
                let plan = self.chat.resume_plan(id).await?;
                let from = plan
                    .next_runnable_step()
                    .map(|s| format!(" from step {}", s.order + 1))
                    .unwrap_or_default();
                Ok(CommandResult::success(format!("Resuming plan #{}{from}.", plan.id)))
            }
            "status" => self.plan_status(parse_optional_id("id", args.get(1))?).await,
            other => Ok(CommandResult::failure(format!(
                "Unknown plan command: {other}. Type `help` for the command list."
            ))),
        }
    }

    /// The live plan, else the newest plan that can still be resumed.
    async fn default_cancel_target(&self) -> Result<Option<u64>> {
        if let Some(plan) = self.chat.live_plan().await? {
            return Ok(Some(plan.id));
        }
        Ok(self
            .chat
            .latest_plan(&[PlanStatus::PartiallyCompleted])
            .await?
            .map(|p| p.id))
    }

    async fn plan_status(&self, id: Option<u64>) -> Result<CommandResult> {
        let plan = match id {
            Some(id) => Some(self.chat.get_plan(id).await?),
            None => match self.chat.live_plan().await? {
                Some(plan) => Some(plan),
                None => self.chat.latest_plan(&[]).await?,
            },
        };

        let Some(plan) = plan else {
            return Ok(CommandResult::success("Plan mode is off. No plans yet."));
        };
        let mode = if plan.status == PlanStatus::Collecting {
            "Plan mode is ON."
        } else {
            "Plan mode is off."
        };
        let body = match plan.status {
            PlanStatus::Completed | PlanStatus::PartiallyCompleted => {
                ExecutionSummary(&plan).to_string()
            }
            _ => plan.to_string(),
        };
        Ok(CommandResult::success(format!("{mode}\n\n{body}")))
    }

    async fn plans(&self) -> Result<CommandResult> {
        let plans = self.chat.get_plans().await?;
        Ok(CommandResult::success(format!("# Plans\n\n{}", Plans(plans))))
    }

    async fn goal(&self, args: &[&str]) -> Result<CommandResult> {
        let Some(title) = rest(args, 0) else {
            return Ok(CommandResult::failure("Usage: goal <description>"));
        };
        let goal = self.chat.create_goal(&title, None).await?;
        Ok(CommandResult::success(format!(
            "Goal #{} created: {}",
            goal.id, goal.title
        )))
    }

    async fn goals(&self, args: &[&str]) -> Result<CommandResult> {
        let Some(sub) = args.first() else {
            let goals = self.chat.get_goals().await?;
            return Ok(CommandResult::success(format!("# Goals\n\n{}", Goals(goals))));
        };

        let sub = sub.to_lowercase();
        if sub == "clear" {
            let removed = self.chat.clear_completed_goals().await?;
            return Ok(CommandResult::success(format!(
                "Removed {removed} finished goals."
            )));
        }

        let id = parse_id("goal_id", args.get(1))?;
        let goal = match sub.as_str() {
            "complete" => self.chat.complete_goal(id).await?,
            "pause" => self.chat.pause_goal(id).await?,
            "resume" => self.chat.resume_goal(id).await?,
            "cancel" => self.chat.cancel_goal(id).await?,
            "delete" => {
                let removal = self.chat.delete_goal(id).await?;
                return Ok(CommandResult::success(format!(
                    "Goal #{} deleted with {} tasks and {} schedules.",
                    removal.goal.id,
                    removal.goal.tasks.len(),
                    removal.removed_schedules
                )));
            }
            other => {
                return Ok(CommandResult::failure(format!(
                    "Unknown goals command: {other}. Type `help` for the command list."
                )))
            }
        };
        Ok(CommandResult::success(format!(
            "Goal #{} is now {}.",
            goal.id,
            goal.status.with_icon()
        )))
    }

    async fn tasks(&self, args: &[&str]) -> Result<CommandResult> {
        let Some(sub) = args.first() else {
            let goals = self.chat.get_goals().await?;
            let open = goals.into_iter().filter(|g| !g.status.is_terminal()).collect();
            return Ok(CommandResult::success(format!("# Tasks\n\n{}", TaskBoard(open))));
        };

        let sub = sub.to_lowercase();
        if sub == "add" {
            let goal_id = parse_id("goal_id", args.get(1))?;
            let Some(title) = rest(args, 2) else {
                return Ok(CommandResult::failure("Usage: tasks add <goalId> <title>"));
            };
            let task = self.chat.add_task(goal_id, &title, None).await?;
            return Ok(CommandResult::success(format!(
                "Task #{} added to goal #{goal_id} at position {}: {}",
                task.id, task.order, task.title
            )));
        }

        let task_id = parse_id("task_id", args.get(1))?;
        let status = match sub.as_str() {
            "done" => "completed",
            "fail" => "failed",
            "skip" => "skipped",
            "delete" => {
                let (task, removed) = self.chat.delete_task(task_id).await?;
                return Ok(CommandResult::success(format!(
                    "Task #{} deleted ({removed} schedules removed).",
                    task.id
                )));
            }
            other => {
                return Ok(CommandResult::failure(format!(
                    "Unknown tasks command: {other}. Type `help` for the command list."
                )))
            }
        };

        let task = self
            .chat
            .update_task_status(&UpdateTaskStatus {
                goal_id: None,
                task_id,
                status: status.to_string(),
                result: rest(args, 2),
            })
            .await?;
        Ok(CommandResult::success(format!(
            "Task #{} '{}' marked {}.",
            task.id,
            task.title,
            task.status.as_str()
        )))
    }

    async fn diary(&self, args: &[&str]) -> Result<CommandResult> {
        let count = match args.first() {
            Some(word) => word
                .parse::<usize>()
                .map_err(|_| {
                    EngineError::invalid_argument("count")
                        .with_reason(format!("'{word}' is not a number"))
                })?
                .clamp(1, MAX_DIARY_COUNT),
            None => DEFAULT_DIARY_COUNT,
        };
        let entries = self.chat.recent_diary(count).await?;
        Ok(CommandResult::success(format!(
            "# Diary\n\n{}",
            DiaryEntries(entries)
        )))
    }

    async fn auto(&self, args: &[&str]) -> Result<CommandResult> {
        let Some(sub) = args.first() else {
            let state = if self.chat.is_auto_mode_enabled().await? { "ON" } else { "OFF" };
            return Ok(CommandResult::success(format!("Auto mode: {state}")));
        };

        match sub.to_lowercase().as_str() {
            "on" => {
                self.chat.set_auto_mode(true).await?;
                Ok(CommandResult::success(
                    "Auto mode enabled. Schedules will run and milestones will be reported here.",
                ))
            }
            "off" => {
                self.chat.set_auto_mode(false).await?;
                Ok(CommandResult::success("Auto mode disabled. Schedules are paused."))
            }
            _ => Ok(CommandResult::failure("Usage: auto [on|off]")),
        }
    }

    async fn schedule(&self, args: &[&str]) -> Result<CommandResult> {
        let Some(sub) = args.first() else {
            return Ok(CommandResult::success(SCHEDULE_HELP));
        };

        match sub.to_lowercase().as_str() {
            kind @ ("goal" | "task") => {
                let id = parse_id(&format!("{kind}_id"), args.get(1))?;
                let target = if kind == "goal" {
                    ScheduleTarget::Goal(id)
                } else {
                    ScheduleTarget::Task(id)
                };
                if args.len() < 3 {
                    return Ok(CommandResult::failure(format!(
                        "Usage: schedule {kind} <{kind}Id> <cron-or-frequency> [repeat]"
                    )));
                }

                let spec = parse_schedule_args(&args[2..])?;
                let entry = self
                    .chat
                    .create_schedule(&CreateSchedule::from((target, spec)))
                    .await?;
                let runs = entry
                    .max_executions
                    .map_or_else(|| "repeats forever".to_string(), |n| format!("runs {n} times"));
                let next = entry
                    .next_execution_at
                    .as_ref()
                    .map(|ts| format!("\nNext run: {}", UtcDateTime(ts)))
                    .unwrap_or_default();
                Ok(CommandResult::success(format!(
                    "Schedule #{} created for {}: `{}` ({runs}).{next}",
                    entry.id, entry.target, entry.cron_expression
                )))
            }
            "list" => {
                let schedules = self.chat.get_schedules().await?;
                Ok(CommandResult::success(format!(
                    "# Schedules\n\n{}",
                    Schedules(schedules)
                )))
            }
            "delete" => {
                let id = parse_id("schedule_id", args.get(1))?;
                let entry = self.chat.delete_schedule(id).await?;
                Ok(CommandResult::success(format!(
                    "Schedule #{} for {} deleted.",
                    entry.id, entry.target
                )))
            }
            "help" => Ok(CommandResult::success(SCHEDULE_HELP)),
            other => Ok(CommandResult::failure(format!(
                "Unknown schedule command: {other}. Type `schedule help` for usage."
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{engine::EngineBuilder, scope::Scope};

    async fn create_router() -> (CommandRouter, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let engine = EngineBuilder::new()
            .with_database_path(Some(temp_dir.path().join("commands.db")))
            .build()
            .await
            .unwrap();
        let chat = engine.scoped(Scope::session("web", "router").unwrap());
        (CommandRouter::new(chat), temp_dir)
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("id", Some(&"#12")).unwrap(), 12);
        assert!(parse_id("id", Some(&"twelve")).is_err());
        assert!(parse_id("id", None).is_err());
        assert_eq!(parse_optional_id("id", None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_commands() {
        let (router, _temp) = create_router().await;
        assert!(!router.dispatch("   ").await.success);

        let result = router.dispatch("/frobnicate now").await;
        assert!(!result.success);
        assert!(result.message.contains("Unknown command: frobnicate"));

        assert!(router.dispatch("/help").await.message.contains("**Commands**"));
    }

    #[tokio::test]
    async fn test_goal_and_task_commands() {
        let (router, _temp) = create_router().await;

        let result = router.dispatch("goal Ship the release").await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.message, "Goal #1 created: Ship the release");

        assert!(router.dispatch("tasks add 1 Tag the release").await.success);
        assert!(router.dispatch("tasks add 1 Publish notes").await.success);

        let result = router.dispatch("tasks done 1 tagged v1.0").await;
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("marked completed"));

        let board = router.dispatch("tasks").await.message;
        assert!(board.contains("- [x] 1. Tag the release"));
        assert!(board.contains("  - tagged v1.0"));
        assert!(board.contains("- [ ] 2. Publish notes"));

        let result = router.dispatch("goals pause 1").await;
        assert!(result.message.contains("Paused"));

        let result = router.dispatch("goals pause 1").await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_goal_usage_and_bad_ids() {
        let (router, _temp) = create_router().await;
        assert_eq!(
            router.dispatch("goal").await,
            CommandResult::failure("Usage: goal <description>")
        );

        let result = router.dispatch("goals complete x").await;
        assert!(!result.success);
        assert!(result.message.contains("goal_id"));

        let result = router.dispatch("goals complete 99").await;
        assert_eq!(result.message, "Goal with ID 99 not found");
    }

    #[tokio::test]
    async fn test_plan_drafting_commands() {
        let (router, _temp) = create_router().await;

        assert!(router.dispatch("plan on fast").await.success);
        assert!(router.dispatch("plan").await.message.contains("Plan mode is ON."));

        let result = router.dispatch("plan add echo hello world").await;
        assert!(result.success, "{}", result.message);
        assert!(result.message.starts_with("Step 1 added to plan #1"));

        let result = router.dispatch("plan done Greeting").await;
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("# Plan #1: Greeting"));
        assert!(result.message.contains("plan approve 1"));

        assert!(router.dispatch("plan off").await.message.contains("not active"));

        let result = router.dispatch("plan cancel").await;
        assert_eq!(result, CommandResult::success("Plan #1 cancelled."));

        let result = router.dispatch("plan approve").await;
        assert_eq!(
            result,
            CommandResult::failure("No plan is waiting for approval.")
        );
    }

    #[tokio::test]
    async fn test_schedule_commands() {
        let (router, _temp) = create_router().await;
        router.dispatch("goal Daily standup").await;

        let result = router.dispatch("schedule goal 1 weekdays 09:30 3").await;
        assert!(result.success, "{}", result.message);
        assert!(result
            .message
            .starts_with("Schedule #1 created for goal #1: `0 30 9 * * MON-FRI` (runs 3 times)."));

        let result = router.dispatch("schedule goal 1 0 30 9 * * 1").await;
        assert!(result.success, "{}", result.message);
        assert!(result
            .message
            .starts_with("Schedule #2 created for goal #1: `0 30 9 * * 1` (repeats forever)."));

        let result = router.dispatch("schedule task 1 0 9 * * *").await;
        assert_eq!(result.message, "Task with ID 1 not found");

        let result = router.dispatch("schedule goal 1 not a cron").await;
        assert!(!result.success);

        let listing = router.dispatch("schedule list").await.message;
        assert!(listing.contains("**#1** goal #1"));

        assert!(router.dispatch("schedule delete 1").await.success);
        assert!(router.dispatch("schedule delete 2").await.success);
        assert!(router
            .dispatch("schedule list")
            .await
            .message
            .contains("No schedules found."));
        assert!(router.dispatch("schedule").await.message.contains("**Scheduling**"));
    }

    #[tokio::test]
    async fn test_auto_mode_commands() {
        let (router, _temp) = create_router().await;
        let mut events = router.session().engine().subscribe();

        assert_eq!(
            router.dispatch("auto").await,
            CommandResult::success("Auto mode: ON")
        );
        assert!(router.dispatch("auto off").await.success);
        assert_eq!(
            router.dispatch("/auto").await,
            CommandResult::success("Auto mode: OFF")
        );
        assert_eq!(
            router.dispatch("auto maybe").await,
            CommandResult::failure("Usage: auto [on|off]")
        );

        assert!(router.dispatch("AUTO ON").await.message.contains("milestones"));
        assert!(router.session().is_auto_mode_enabled().await.unwrap());

        let mut switches = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let crate::engine::EngineEvent::AutoModeChanged { scope, enabled } = event {
                assert_eq!(&scope, router.session().scope());
                switches.push(enabled);
            }
        }
        assert_eq!(switches, vec![false, true]);
    }

    #[tokio::test]
    async fn test_diary_count() {
        let (router, _temp) = create_router().await;
        assert!(router.dispatch("diary").await.message.contains("The diary is empty."));
        assert!(!router.dispatch("diary lots").await.success);

        router.dispatch("goal Write docs").await;
        router.dispatch("goals complete 1").await;
        let diary = router.dispatch("diary 500").await.message;
        assert!(diary.contains("PROGRESS"));
    }
}
