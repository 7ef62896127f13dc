//! Plan model.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{PlanStatus, PlanStep, StepStatus};
use crate::scope::Scope;

/// An approvable, steppable unit of autonomous work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: u64,
    pub scope: Scope,
    pub title: String,
    pub description: Option<String>,
    pub status: PlanStatus,
    /// Routing hint handed through to the step executor untouched
    pub model_tier: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Steps sorted by `order`
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn count_steps(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn completed_step_count(&self) -> usize {
        self.count_steps(StepStatus::Completed)
    }

    pub fn failed_step_count(&self) -> usize {
        self.count_steps(StepStatus::Failed)
    }

    /// Whether every step is Completed or Skipped.
    pub fn all_steps_done(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_done())
    }

    /// First step a run would attempt next.
    pub fn next_runnable_step(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.status.is_runnable())
    }
}
