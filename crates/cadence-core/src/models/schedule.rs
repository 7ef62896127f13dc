//! Schedule entry model.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// What a schedule fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ScheduleTarget {
    Goal(u64),
    Task(u64),
}

impl ScheduleTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleTarget::Goal(_) => "goal",
            ScheduleTarget::Task(_) => "task",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            ScheduleTarget::Goal(id) | ScheduleTarget::Task(id) => *id,
        }
    }

    /// Rebuilds a target from its stored `(kind, id)` pair.
    pub fn from_parts(kind: &str, id: u64) -> Result<Self, String> {
        match kind.to_lowercase().as_str() {
            "goal" => Ok(ScheduleTarget::Goal(id)),
            "task" => Ok(ScheduleTarget::Task(id)),
            _ => Err(format!("Invalid schedule target type: {kind}")),
        }
    }
}

impl fmt::Display for ScheduleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleTarget::Goal(id) => write!(f, "goal #{id}"),
            ScheduleTarget::Task(id) => write!(f, "task #{id}"),
        }
    }
}

impl FromStr for ScheduleTarget {
    type Err = String;

    /// Parses `goal:12` or `task:3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid schedule target: {s}"))?;
        let id = id
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("Invalid schedule target id: {id}"))?;
        Self::from_parts(kind.trim(), id)
    }
}

/// A recurring cron-driven trigger bound to a goal or task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub id: u64,
    /// Scope of the target goal
    pub scope: Scope,
    pub target: ScheduleTarget,
    /// Normalized six-field expression
    pub cron_expression: String,
    pub enabled: bool,
    /// `None` repeats forever
    pub max_executions: Option<u32>,
    pub execution_count: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_executed_at: Option<Timestamp>,
    pub next_execution_at: Option<Timestamp>,
}

impl ScheduleEntry {
    /// Whether a bounded entry has used up all of its runs.
    pub fn is_exhausted(&self) -> bool {
        self.max_executions
            .is_some_and(|max| self.execution_count >= max)
    }

    /// Whether the tick at `now` should fire this entry.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.enabled
            && !self.is_exhausted()
            && self.next_execution_at.is_some_and(|next| next <= now)
    }
}
