//! Display implementations for domain models.

use std::fmt;

use super::datetime::UtcDateTime;
use crate::models::{
    DiaryEntry, DiaryType, Goal, GoalStatus, Plan, PlanStatus, PlanStep, ScheduleEntry,
    StepStatus, Task, TaskStatus,
};

macro_rules! display_as_str {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

display_as_str!(GoalStatus, TaskStatus, PlanStatus, StepStatus, DiaryType);

impl Goal {
    /// One-line heading used in goal listings.
    pub(crate) fn fmt_heading(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = if self.tasks.is_empty() {
            String::new()
        } else {
            format!(" ({}/{})", self.completed_task_count(), self.tasks.len())
        };
        writeln!(
            f,
            "## #{} {}{progress} ({})",
            self.id,
            self.title,
            self.status.with_icon()
        )
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_heading(f)?;
        writeln!(f)?;

        if let Some(desc) = &self.description {
            writeln!(f, "{desc}")?;
            writeln!(f)?;
        }
        writeln!(f, "- Created: {}", UtcDateTime(&self.created_at))?;

        if self.tasks.is_empty() {
            writeln!(f, "\nNo tasks yet.")?;
        } else {
            writeln!(f)?;
            for task in &self.tasks {
                write!(f, "{task}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "- {} {}. {} (task #{})",
            self.status.marker(),
            self.order,
            self.title,
            self.id
        )?;
        // Results of finished work only; a pending task has none.
        if matches!(self.status, TaskStatus::Completed | TaskStatus::Failed) {
            if let Some(result) = self.result.as_deref().filter(|r| !r.is_empty()) {
                writeln!(f, "  - {result}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Plan #{}: {}", self.id, self.title)?;
        writeln!(f)?;
        writeln!(f, "- Status: {}", self.status.with_icon())?;
        if let Some(tier) = &self.model_tier {
            writeln!(f, "- Model tier: {tier}")?;
        }
        writeln!(
            f,
            "- Progress: {}/{} completed",
            self.completed_step_count(),
            self.steps.len()
        )?;
        writeln!(f, "- Updated: {}", UtcDateTime(&self.updated_at))?;

        if let Some(desc) = &self.description {
            writeln!(f)?;
            writeln!(f, "{desc}")?;
        }

        if self.steps.is_empty() {
            writeln!(f, "\nNo steps in this plan.")?;
        } else {
            writeln!(f, "\n## Steps")?;
            writeln!(f)?;
            for step in &self.steps {
                write!(f, "{step}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}. `{}`: {}",
            self.status.icon(),
            self.order + 1,
            self.tool_name,
            self.description
        )?;
        if self.status != StepStatus::Pending {
            if let Some(result) = &self.result {
                writeln!(f, "   {result}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runs = match self.max_executions {
            Some(max) => format!("{}/{max}", self.execution_count),
            None => format!("{}/unlimited", self.execution_count),
        };
        write!(
            f,
            "- **#{}** {}: `{}` (runs {runs}",
            self.id, self.target, self.cron_expression
        )?;
        match (&self.next_execution_at, self.enabled) {
            (Some(next), true) => write!(f, ", next {}", UtcDateTime(next))?,
            _ => write!(f, ", disabled")?,
        }
        writeln!(f, ")")
    }
}

impl fmt::Display for DiaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "- [{}] **{}**: {}",
            UtcDateTime(&self.created_at),
            self.entry_type.label(),
            self.content
        )
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use crate::models::{ScheduleTarget, Task};
    use crate::scope::Scope;

    use super::*;

    fn ts() -> Timestamp {
        "2025-01-06T09:30:00Z".parse().unwrap()
    }

    fn task(order: u32, status: TaskStatus, result: Option<&str>) -> Task {
        Task {
            id: u64::from(order) + 100,
            goal_id: 1,
            title: format!("Task {order}"),
            description: None,
            status,
            order,
            result: result.map(String::from),
            created_at: ts(),
            updated_at: ts(),
        }
    }

    #[test]
    fn test_goal_display() {
        let goal = Goal {
            id: 1,
            scope: Scope::Global,
            title: "Ship release".to_string(),
            description: Some("Cut 1.0".to_string()),
            status: GoalStatus::Active,
            created_at: ts(),
            updated_at: ts(),
            tasks: vec![
                task(1, TaskStatus::Completed, Some("tagged v1.0")),
                task(2, TaskStatus::Pending, None),
            ],
        };
        let output = goal.to_string();
        assert!(output.contains("## #1 Ship release (1/2) (▶ Active)"));
        assert!(output.contains("- [x] 1. Task 1 (task #101)"));
        assert!(output.contains("  - tagged v1.0"));
        assert!(output.contains("- [ ] 2. Task 2 (task #102)"));
        assert!(output.contains("Cut 1.0"));
    }

    #[test]
    fn test_step_display_hides_pending_result() {
        let mut step = PlanStep {
            id: 1,
            plan_id: 1,
            tool_name: "shell".to_string(),
            description: "run tests".to_string(),
            arguments: serde_json::json!({}),
            order: 0,
            status: StepStatus::Failed,
            result: Some("exit 1".to_string()),
            executed_at: None,
        };
        assert_eq!(step.to_string(), "✗ 1. `shell`: run tests\n   exit 1\n");

        step.status = StepStatus::Pending;
        assert_eq!(step.to_string(), "○ 1. `shell`: run tests\n");
    }

    #[test]
    fn test_schedule_display() {
        let mut entry = ScheduleEntry {
            id: 3,
            scope: Scope::Global,
            target: ScheduleTarget::Goal(1),
            cron_expression: "0 30 9 * * MON-FRI".to_string(),
            enabled: true,
            max_executions: Some(3),
            execution_count: 1,
            created_at: ts(),
            updated_at: ts(),
            last_executed_at: None,
            next_execution_at: Some(ts()),
        };
        assert_eq!(
            entry.to_string(),
            "- **#3** goal #1: `0 30 9 * * MON-FRI` (runs 1/3, next 2025-01-06 09:30 UTC)\n"
        );

        entry.enabled = false;
        entry.next_execution_at = None;
        entry.max_executions = None;
        assert!(entry.to_string().contains("(runs 1/unlimited, disabled)"));
    }
}
