//! Parameter structures for engine operations.
//!
//! These are plain serde structs shared by the command router, the CLI and
//! any management surface layered on top of the engine. They carry raw user
//! input; `validate` methods turn them into typed values.

use serde::{Deserialize, Serialize};

use crate::{
    cron::{CronSchedule, ScheduleFrequency, ScheduleSpec, TimeOfDay},
    error::{EngineError, Result},
    models::{ScheduleTarget, TaskStatus},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateGoal {
    pub title: String,
    pub description: Option<String>,
}

impl CreateGoal {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::invalid_argument("title").with_reason("must not be empty"));
        }
        Ok(())
    }
}

/// A task to append to a goal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    /// Position within the goal; defaults to after the last task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskStatus {
    /// When set, the task must belong to this goal
    pub goal_id: Option<u64>,
    pub task_id: u64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl UpdateTaskStatus {
    pub fn validate(&self) -> Result<TaskStatus> {
        self.status.parse::<TaskStatus>().map_err(|_| {
            EngineError::invalid_argument("status").with_reason(format!(
                "Invalid status: {}. Must be one of pending, in_progress, completed, failed, skipped",
                self.status
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddStep {
    pub tool_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A schedule from a raw cron expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSchedule {
    pub target: ScheduleTarget,
    pub cron_expression: String,
    /// `None` repeats forever
    #[serde(default)]
    pub max_executions: Option<u32>,
}

impl CreateSchedule {
    pub fn validate(&self) -> Result<CronSchedule> {
        CronSchedule::parse(&self.cron_expression)
    }
}

impl From<(ScheduleTarget, ScheduleSpec)> for CreateSchedule {
    fn from((target, spec): (ScheduleTarget, ScheduleSpec)) -> Self {
        Self {
            target,
            cron_expression: spec.cron_expression,
            max_executions: spec.max_executions,
        }
    }
}

/// A schedule from structured frequency input, as a dashboard form submits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencySchedule {
    pub target: ScheduleTarget,
    /// `daily`, `weekdays`, `weekly` or `custom`
    pub frequency: String,
    /// 1 (Monday) through 7 (Sunday); required for weekly and custom
    #[serde(default)]
    pub days: Vec<u8>,
    /// `HH:mm` or `HHmm`, UTC
    pub time: String,
    /// Zero or absent repeats forever
    #[serde(default)]
    pub max_executions: Option<i64>,
}

impl FrequencySchedule {
    /// Converts to a cron-based request.
    pub fn validate(&self) -> Result<CreateSchedule> {
        let time = self.time.parse::<TimeOfDay>()?;
        let cron_expression = ScheduleFrequency::from_parts(&self.frequency, &self.days)?.to_cron(time)?;

        let max_executions = match self.max_executions {
            None | Some(0) => None,
            Some(n) if n < 0 => {
                return Err(EngineError::invalid_argument("max_executions")
                    .with_reason("must be >= 0"));
            }
            Some(n) => Some(u32::try_from(n).map_err(|_| {
                EngineError::invalid_argument("max_executions").with_reason("is too large")
            })?),
        };

        Ok(CreateSchedule {
            target: self.target,
            cron_expression,
            max_executions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_task_status_validate() {
        let params = UpdateTaskStatus {
            task_id: 1,
            status: "done".to_string(),
            ..Default::default()
        };
        assert_eq!(params.validate().unwrap(), TaskStatus::Completed);

        let params = UpdateTaskStatus {
            task_id: 1,
            status: "finished".to_string(),
            ..Default::default()
        };
        match params.validate().unwrap_err() {
            EngineError::InvalidArgument { field, reason } => {
                assert_eq!(field, "status");
                assert!(reason.contains("finished"));
            }
            other => panic!("Expected InvalidArgument error, got {other:?}"),
        }
    }

    #[test]
    fn test_frequency_schedule_validate() {
        let params = FrequencySchedule {
            target: ScheduleTarget::Goal(4),
            frequency: "weekly".to_string(),
            days: vec![2, 4],
            time: "0815".to_string(),
            max_executions: Some(0),
        };
        let request = params.validate().unwrap();
        assert_eq!(request.cron_expression, "0 15 8 * * TUE,THU");
        assert_eq!(request.max_executions, None);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_frequency_schedule_rejects_negative_repeat() {
        let params = FrequencySchedule {
            target: ScheduleTarget::Task(1),
            frequency: "daily".to_string(),
            days: vec![],
            time: "09:00".to_string(),
            max_executions: Some(-2),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_frequency_schedule_rejects_unknown_frequency() {
        let params = FrequencySchedule {
            target: ScheduleTarget::Task(1),
            frequency: "hourly".to_string(),
            days: vec![],
            time: "09:00".to_string(),
            max_executions: None,
        };
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported frequency"));
    }
}
