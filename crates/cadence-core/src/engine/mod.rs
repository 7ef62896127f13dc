//! High-level engine API.
//!
//! [`Engine`] is the entry point for channel adapters and management
//! surfaces. It coordinates the database, the background plan runs and the
//! scheduler tick. Operations are grouped by component:
//!
//! - [`backlog`]: goals, tasks and the diary
//! - [`plans`]: plan drafting, approval, cancellation and resume
//! - [`executor`]: background step execution and the run registry
//! - [`scheduler`]: schedule entries and the periodic tick
//! - [`session`]: [`ScopedEngine`], the engine bound to one conversation
//!
//! Every method that takes `Option<&Scope>` treats `None` as an unscoped
//! management call and `Some(scope)` as a conversation call: entities owned
//! by another scope are reported as not found.
//!
//! ```rust,no_run
//! use cadence_core::{EngineBuilder, Scope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = EngineBuilder::new()
//!     .with_database_path(Some("cadence.db"))
//!     .build()
//!     .await?;
//!
//! let chat = engine.scoped(Scope::session("telegram", "42")?);
//! let goal = chat.create_goal("Ship release", None).await?;
//! chat.add_task(goal.id, "Tag the release", None).await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task;

use crate::{
    config::EngineConfig,
    db::Database,
    error::{EngineError, Result},
    scope::{Scope, ScopeResolver},
};

pub mod backlog;
pub mod builder;
pub mod events;
pub mod executor;
pub mod plans;
pub mod scheduler;
pub mod session;


pub use builder::EngineBuilder;
pub use events::{EngineEvent, EventBus, PlanAction};
pub use executor::{ExecutionRegistry, StepExecutor, StepOutcome, StepRequest};
pub use scheduler::{SchedulerHandle, TaskRunOutcome, TickReport, WorkRunner};
pub use session::ScopedEngine;

/// Work orchestration engine. Clone is cheap.
#[derive(Clone)]
pub struct Engine {
    pub(crate) db_path: PathBuf,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) resolver: ScopeResolver,
    pub(crate) events: EventBus,
    pub(crate) executions: ExecutionRegistry,
    pub(crate) step_executor: Arc<dyn StepExecutor>,
    pub(crate) work_runner: Arc<dyn WorkRunner>,
    pub(crate) tick_running: Arc<AtomicBool>,
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database_path(&self) -> &std::path::Path {
        &self.db_path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn executions(&self) -> &ExecutionRegistry {
        &self.executions
    }

    /// Binds the engine to one conversation.
    pub fn scoped(&self, scope: Scope) -> ScopedEngine {
        ScopedEngine::new(self.clone(), scope)
    }

    /// Resolves an inbound (channel, conversation) pair and binds to it.
    pub fn for_channel(&self, channel: &str, conversation_key: Option<&str>) -> Result<ScopedEngine> {
        let scope = self.resolver.resolve(channel, conversation_key)?;
        Ok(self.scoped(scope))
    }

    /// Runs a database operation on the blocking pool with its own
    /// connection.
    pub(crate) async fn with_db<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut db = Database::new(&db_path)?;
            op(&mut db)
        })
        .await
        .map_err(EngineError::join)?
    }
}
