//! Report published when a plan run ends.

use std::fmt;

use crate::models::{Plan, PlanStatus};

const RESULT_PREVIEW_CHARS: usize = 100;

/// Markdown summary of a finished (or stopped) plan run.
///
/// Lists every step with its status icon and a short preview of its result,
/// followed by the completed/failed counts. A partially completed plan gets a
/// hint on how to resume it.
pub struct ExecutionSummary<'a>(pub &'a Plan);

fn preview(text: &str) -> String {
    match text.char_indices().nth(RESULT_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

impl fmt::Display for ExecutionSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.0;
        let outcome = if plan.status == PlanStatus::Completed {
            "Complete"
        } else {
            "Stopped"
        };
        writeln!(f, "**Plan Execution {outcome}**")?;
        writeln!(f)?;

        for step in &plan.steps {
            write!(f, "{} `{}`", step.status.icon(), step.tool_name)?;
            if !step.description.is_empty() {
                write!(f, ": {}", step.description)?;
            }
            writeln!(f)?;
            if let Some(result) = step.result.as_deref().filter(|r| !r.trim().is_empty()) {
                writeln!(f, "   {}", preview(result))?;
            }
        }

        writeln!(f)?;
        write!(
            f,
            "{}/{} completed",
            plan.completed_step_count(),
            plan.steps.len()
        )?;
        let failed = plan.failed_step_count();
        if failed > 0 {
            write!(f, ", {failed} failed")?;
        }
        writeln!(f)?;

        if plan.status == PlanStatus::PartiallyCompleted {
            writeln!(
                f,
                "Use `plan resume {}` to continue from the failed step.",
                plan.id
            )?;
        }
        Ok(())
    }
}
