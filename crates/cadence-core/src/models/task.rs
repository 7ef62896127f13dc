//! Task model.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::TaskStatus;

/// One unit of work under a goal. Its status is independent of the goal's.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: u64,
    pub goal_id: u64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Unique within the goal
    pub order: u32,
    pub result: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
