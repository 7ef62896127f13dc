//! Goal model.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{GoalStatus, Task, TaskStatus};
use crate::scope::Scope;

/// A longer-lived objective owning an ordered backlog of tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: u64,
    pub scope: Scope,
    pub title: String,
    pub description: Option<String>,
    pub status: GoalStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Tasks sorted by `order`
    pub tasks: Vec<Task>,
}

impl Goal {
    pub fn completed_task_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// First pending task by order.
    pub fn next_pending_task(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| t.order)
    }

    /// True when every task is finished (vacuously false for an empty goal).
    pub fn all_tasks_finished(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status.is_finished())
    }
}
