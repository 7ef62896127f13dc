//! Plan step model.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::StepStatus;

/// One ordered, tool-invoking unit of work within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub id: u64,
    pub plan_id: u64,
    /// Capability the step executor should invoke
    pub tool_name: String,
    pub description: String,
    /// Opaque arguments for the tool
    pub arguments: serde_json::Value,
    pub order: u32,
    pub status: StepStatus,
    /// Output or error text, truncated
    pub result: Option<String>,
    pub executed_at: Option<Timestamp>,
}
