//! Collection wrapper types for displaying groups of domain objects.
//!
//! Each wrapper formats its items one after another and prints a fixed
//! message when the collection is empty.

use std::fmt;

use super::datetime::UtcDateTime;
use crate::models::{DiaryEntry, Goal, Plan, ScheduleEntry};

/// Goals with their progress, without task detail.
pub struct Goals(pub Vec<Goal>);

/// Goals with every task listed underneath.
pub struct TaskBoard(pub Vec<Goal>);

/// Plans as one line each, newest first.
pub struct Plans(pub Vec<Plan>);

pub struct Schedules(pub Vec<ScheduleEntry>);

pub struct DiaryEntries(pub Vec<DiaryEntry>);

impl fmt::Display for Goals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No goals found.");
        }
        for goal in &self.0 {
            goal.fmt_heading(f)?;
            if let Some(desc) = &goal.description {
                writeln!(f, "{desc}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for TaskBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|g| g.tasks.is_empty()) {
            return writeln!(f, "No tasks found.");
        }
        for goal in self.0.iter().filter(|g| !g.tasks.is_empty()) {
            goal.fmt_heading(f)?;
            writeln!(f)?;
            for task in &goal.tasks {
                write!(f, "{task}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Plans {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No plans found.");
        }
        for plan in &self.0 {
            writeln!(
                f,
                "- **#{}** {} ({}, {}/{} steps, {})",
                plan.id,
                plan.title,
                plan.status.with_icon(),
                plan.completed_step_count(),
                plan.steps.len(),
                UtcDateTime(&plan.updated_at)
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Schedules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No schedules found.");
        }
        for entry in &self.0 {
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DiaryEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "The diary is empty.");
        }
        for entry in &self.0 {
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
