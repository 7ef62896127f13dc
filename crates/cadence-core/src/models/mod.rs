//! Data models for goals, tasks, plans, steps, schedules and diary entries.
//!
//! Back-references (task to goal, step to plan) are plain ids. Parents load
//! their children eagerly, so a fetched [`Goal`] carries its tasks and a
//! fetched [`Plan`] carries its steps, both sorted by `order`. Display
//! implementations live in [`crate::display::models`].

pub mod diary;
pub mod goal;
pub mod plan;
pub mod schedule;
pub mod status;
pub mod step;
pub mod task;

#[cfg(test)]
mod tests;

pub use diary::DiaryEntry;
pub use goal::Goal;
pub use plan::Plan;
pub use schedule::{ScheduleEntry, ScheduleTarget};
pub use status::{DiaryType, GoalStatus, PlanStatus, PlanTransition, StepStatus, TaskStatus};
pub use step::PlanStep;
pub use task::Task;
