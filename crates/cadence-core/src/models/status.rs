//! Status enumerations and their guarded transitions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(GoalStatus::Active),
            "paused" => Ok(GoalStatus::Paused),
            "completed" => Ok(GoalStatus::Completed),
            "cancelled" | "canceled" => Ok(GoalStatus::Cancelled),
            _ => Err(format!("Invalid goal status: {s}")),
        }
    }
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Paused => "paused",
            GoalStatus::Completed => "completed",
            GoalStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Cancelled)
    }

    /// Only Active and Paused may flip back and forth; everything else is
    /// one-way.
    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        use GoalStatus::*;
        matches!(
            (self, next),
            (Active, Paused)
                | (Paused, Active)
                | (Active | Paused, Completed)
                | (Active | Paused, Cancelled)
        )
    }

    pub fn with_icon(&self) -> &'static str {
        match self {
            GoalStatus::Active => "▶ Active",
            GoalStatus::Paused => "⏸ Paused",
            GoalStatus::Completed => "✓ Completed",
            GoalStatus::Cancelled => "✗ Cancelled",
        }
    }
}

/// Lifecycle of a task within a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "inprogress" => Ok(TaskStatus::InProgress),
            "completed" | "done" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "skipped" => Ok(TaskStatus::Skipped),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Completed and Skipped tasks are never picked up again by a schedule.
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }

    /// Checkbox marker used in task listings.
    pub fn marker(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[>]",
            TaskStatus::Completed => "[x]",
            TaskStatus::Failed => "[!]",
            TaskStatus::Skipped => "[-]",
        }
    }
}

/// Lifecycle of a plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Steps are being drafted
    Collecting,
    /// Drafting finished, waiting for approval
    Ready,
    /// Approved, waiting for an executor to pick it up
    Approved,
    Executing,
    Completed,
    /// Execution stopped with failed, skipped or untouched steps
    PartiallyCompleted,
    Cancelled,
}

/// Inputs to the plan state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTransition {
    Finalize,
    Approve,
    Begin,
    Resume,
    Cancel,
    /// Drafting abandoned through `plan off`
    Abandon,
    Finish { all_steps_done: bool },
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "collecting" => Ok(PlanStatus::Collecting),
            "ready" => Ok(PlanStatus::Ready),
            "approved" => Ok(PlanStatus::Approved),
            "executing" => Ok(PlanStatus::Executing),
            "completed" => Ok(PlanStatus::Completed),
            "partially_completed" | "partiallycompleted" => Ok(PlanStatus::PartiallyCompleted),
            "cancelled" | "canceled" => Ok(PlanStatus::Cancelled),
            _ => Err(format!("Invalid plan status: {s}")),
        }
    }
}

impl PlanStatus {
    /// Statuses that occupy a scope's single live-plan slot.
    pub const LIVE: [PlanStatus; 4] = [
        PlanStatus::Collecting,
        PlanStatus::Ready,
        PlanStatus::Approved,
        PlanStatus::Executing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Collecting => "collecting",
            PlanStatus::Ready => "ready",
            PlanStatus::Approved => "approved",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::PartiallyCompleted => "partially_completed",
            PlanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_live(&self) -> bool {
        Self::LIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Cancelled)
    }

    /// Returns the status reached by applying `transition`, or `None` when the
    /// transition is not allowed from `self`.
    pub fn apply(self, transition: PlanTransition) -> Option<PlanStatus> {
        use PlanStatus::*;
        match (self, transition) {
            (Collecting, PlanTransition::Finalize) => Some(Ready),
            (Collecting, PlanTransition::Abandon) => Some(Cancelled),
            (Ready, PlanTransition::Approve) => Some(Approved),
            (Approved, PlanTransition::Begin) => Some(Executing),
            (PartiallyCompleted, PlanTransition::Resume) => Some(Approved),
            (Executing, PlanTransition::Finish { all_steps_done: true }) => Some(Completed),
            (Executing, PlanTransition::Finish { all_steps_done: false }) => {
                Some(PartiallyCompleted)
            }
            (Collecting | Ready | Approved | Executing | PartiallyCompleted, PlanTransition::Cancel) => {
                Some(Cancelled)
            }
            _ => None,
        }
    }

    pub fn with_icon(&self) -> &'static str {
        match self {
            PlanStatus::Collecting => "✎ Collecting",
            PlanStatus::Ready => "? Ready for approval",
            PlanStatus::Approved => "✓ Approved",
            PlanStatus::Executing => "➤ Executing",
            PlanStatus::Completed => "✓ Completed",
            PlanStatus::PartiallyCompleted => "◐ Partially completed",
            PlanStatus::Cancelled => "✗ Cancelled",
        }
    }
}

impl PlanTransition {
    pub fn verb(&self) -> &'static str {
        match self {
            PlanTransition::Finalize => "finalize",
            PlanTransition::Approve => "approve",
            PlanTransition::Begin => "execute",
            PlanTransition::Resume => "resume",
            PlanTransition::Cancel => "cancel",
            PlanTransition::Abandon => "abandon",
            PlanTransition::Finish { .. } => "finish",
        }
    }
}

/// Lifecycle of a single plan step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(StepStatus::Pending),
            "in_progress" | "inprogress" => Ok(StepStatus::InProgress),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            _ => Err(format!("Invalid step status: {s}")),
        }
    }
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    /// Steps a run (or a resumed run) still has to attempt.
    pub fn is_runnable(&self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::Failed)
    }

    /// Steps that count towards a fully completed plan.
    pub fn is_done(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }

    /// Status icon used in plan listings and execution summaries.
    ///
    /// - `✓` completed
    /// - `✗` failed
    /// - `⊘` skipped
    /// - `➤` running
    /// - `○` pending
    pub fn icon(&self) -> &'static str {
        match self {
            StepStatus::Completed => "✓",
            StepStatus::Failed => "✗",
            StepStatus::Skipped => "⊘",
            StepStatus::InProgress => "➤",
            StepStatus::Pending => "○",
        }
    }
}

/// Kind of diary entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiaryType {
    #[default]
    Thought,
    Progress,
    Observation,
    Question,
    Decision,
}

impl FromStr for DiaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thought" => Ok(DiaryType::Thought),
            "progress" => Ok(DiaryType::Progress),
            "observation" => Ok(DiaryType::Observation),
            "question" => Ok(DiaryType::Question),
            "decision" => Ok(DiaryType::Decision),
            _ => Err(format!("Invalid diary type: {s}")),
        }
    }
}

impl DiaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiaryType::Thought => "thought",
            DiaryType::Progress => "progress",
            DiaryType::Observation => "observation",
            DiaryType::Question => "question",
            DiaryType::Decision => "decision",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DiaryType::Thought => "THOUGHT",
            DiaryType::Progress => "PROGRESS",
            DiaryType::Observation => "OBSERVATION",
            DiaryType::Question => "QUESTION",
            DiaryType::Decision => "DECISION",
        }
    }
}
