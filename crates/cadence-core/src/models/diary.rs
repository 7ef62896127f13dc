//! Diary entry model.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::DiaryType;
use crate::scope::Scope;

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiaryEntry {
    pub id: u64,
    pub scope: Scope,
    pub entry_type: DiaryType,
    pub content: String,
    pub goal_id: Option<u64>,
    pub task_id: Option<u64>,
    pub created_at: Timestamp,
}
