//! Engine events published to channel adapters.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    models::{GoalStatus, PlanStatus, ScheduleTarget, TaskStatus},
    scope::Scope,
};

const EVENT_CAPACITY: usize = 256;

/// Inline action offered with a Ready plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Approve,
    Cancel,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAction::Approve => "approve",
            PlanAction::Cancel => "cancel",
        }
    }
}

impl std::str::FromStr for PlanAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(PlanAction::Approve),
            "cancel" => Ok(PlanAction::Cancel),
            _ => Err(format!("Invalid plan action: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A drafted plan waits for approval; adapters render the actions as
    /// buttons and route the press to `handle_approval_callback`.
    PlanReady {
        scope: Scope,
        plan_id: u64,
        title: String,
        step_count: usize,
        actions: Vec<PlanAction>,
    },
    PlanStatusChanged {
        scope: Scope,
        plan_id: u64,
        status: PlanStatus,
    },
    /// Markdown summary of a finished execution run
    PlanExecutionFinished {
        scope: Scope,
        plan_id: u64,
        status: PlanStatus,
        summary: String,
    },
    GoalStatusChanged {
        scope: Scope,
        goal_id: u64,
        status: GoalStatus,
    },
    TaskStatusChanged {
        scope: Scope,
        goal_id: u64,
        task_id: u64,
        status: TaskStatus,
    },
    ScheduleFired {
        scope: Scope,
        schedule_id: u64,
        target: ScheduleTarget,
        /// False when the trigger found nothing to do
        acted: bool,
    },
    Milestone {
        scope: Scope,
        message: String,
    },
    /// Auto mode was switched from `scope`; that conversation receives
    /// milestone notifications from then on.
    AutoModeChanged {
        scope: Scope,
        enabled: bool,
    },
}

impl EngineEvent {
    pub fn scope(&self) -> &Scope {
        match self {
            EngineEvent::PlanReady { scope, .. }
            | EngineEvent::PlanStatusChanged { scope, .. }
            | EngineEvent::PlanExecutionFinished { scope, .. }
            | EngineEvent::GoalStatusChanged { scope, .. }
            | EngineEvent::TaskStatusChanged { scope, .. }
            | EngineEvent::ScheduleFired { scope, .. }
            | EngineEvent::Milestone { scope, .. }
            | EngineEvent::AutoModeChanged { scope, .. } => scope,
        }
    }
}

/// Broadcast fan-out of engine events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is fine.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
