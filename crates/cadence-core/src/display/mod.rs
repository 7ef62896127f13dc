//! Markdown formatting for engine entities and command replies.
//!
//! Domain models implement `Display` directly (see [`models`]); collections
//! are wrapped in newtypes from [`collections`] so that empty listings get a
//! consistent message. Every formatter produces markdown that the command
//! layer hands to channel adapters as is.
//!
//! - [`collections`]: Goals, TaskBoard, Plans, Schedules, DiaryEntries
//! - [`datetime`]: timestamp formatting
//! - [`models`]: Display implementations for domain models
//! - [`status`]: [`CommandResult`], the reply to one command
//! - [`summary`]: [`ExecutionSummary`], the report published when a plan run ends
//!
//! ```rust
//! use cadence_core::display::CommandResult;
//!
//! let ok = CommandResult::success("Goal #1 created");
//! assert!(ok.success);
//! assert_eq!(ok.to_string(), "Goal #1 created\n");
//! ```

pub mod collections;
pub mod datetime;
pub mod models;
pub mod status;
pub mod summary;

pub use collections::{DiaryEntries, Goals, Plans, Schedules, TaskBoard};
pub use datetime::UtcDateTime;
pub use status::CommandResult;
pub use summary::ExecutionSummary;
