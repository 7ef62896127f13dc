//! Core library for the Cadence work orchestration engine.
//!
//! The engine coordinates three kinds of autonomous work, all owned by a
//! conversation [`Scope`]:
//!
//! - a **goal backlog**: long-lived goals with ordered tasks and a diary
//! - **plans**: drafted step by step, approved, then executed in the
//!   background by an external [`StepExecutor`]
//! - **schedules**: cron triggers that hand goals and tasks to an external
//!   [`WorkRunner`] on every tick
//!
//! Channel adapters talk to a [`ScopedEngine`] directly or route text through
//! a [`CommandRouter`], and subscribe to [`EngineEvent`]s to deliver results.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cadence_core::{CommandRouter, EngineBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = EngineBuilder::new()
//!     .with_database_path(Some("cadence.db"))
//!     .build()
//!     .await?;
//!
//! let router = CommandRouter::new(engine.for_channel("web", Some("chat-1"))?);
//! let reply = router.dispatch("goal Ship release").await;
//! println!("{reply}");
//!
//! let scheduler = engine.start_scheduler();
//! if let Some(handle) = scheduler {
//!     handle.shutdown().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod cron;
pub mod db;
pub mod display;
pub mod engine;
pub mod error;
pub mod models;
pub mod params;
pub mod scope;

// Re-export commonly used types
pub use commands::CommandRouter;
pub use config::{load_config, EngineConfig};
pub use cron::{CronSchedule, ScheduleFrequency, TimeOfDay};
pub use db::Database;
pub use display::{CommandResult, ExecutionSummary};
pub use engine::{
    Engine, EngineBuilder, EngineEvent, PlanAction, SchedulerHandle, ScopedEngine, StepExecutor,
    StepOutcome, StepRequest, TaskRunOutcome, TickReport, WorkRunner,
};
pub use error::{EngineError, ErrorKind, Result};
pub use models::{
    DiaryEntry, DiaryType, Goal, GoalStatus, Plan, PlanStatus, PlanStep, ScheduleEntry,
    ScheduleTarget, StepStatus, Task, TaskStatus,
};
pub use params::{AddStep, CreateGoal, CreateSchedule, FrequencySchedule, NewTask, UpdateTaskStatus};
pub use scope::{Scope, ScopeResolver, SessionIdentity};
