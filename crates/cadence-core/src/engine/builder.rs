//! Builder for creating and configuring Engine instances.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{info, warn};
use tokio::task;

use super::{
    events::EventBus,
    executor::{ExecutionRegistry, StepExecutor, UnavailableStepExecutor},
    scheduler::{UnavailableWorkRunner, WorkRunner},
    Engine,
};
use crate::{
    config::EngineConfig,
    db::Database,
    error::{EngineError, Result},
    scope::ScopeResolver,
};

/// Builder for creating and configuring Engine instances.
pub struct EngineBuilder {
    database_path: Option<PathBuf>,
    config: EngineConfig,
    step_executor: Option<Arc<dyn StepExecutor>>,
    work_runner: Option<Arc<dyn WorkRunner>>,
}

impl EngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            database_path: None,
            config: EngineConfig::default(),
            step_executor: None,
            work_runner: None,
        }
    }

    /// Sets a custom database file path.
    ///
    /// If not specified, uses XDG Base Directory specification:
    /// `$XDG_DATA_HOME/cadence/cadence.db` or `~/.local/share/cadence/cadence.db`
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.database_path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the capability that runs plan steps.
    pub fn with_step_executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.step_executor = Some(executor);
        self
    }

    /// Sets the agent loop that scheduled goals and tasks are handed to.
    pub fn with_work_runner(mut self, runner: Arc<dyn WorkRunner>) -> Self {
        self.work_runner = Some(runner);
        self
    }

    /// Builds the configured engine.
    ///
    /// Opening the database also recovers plans whose run was cut short by
    /// a crash or restart.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` if the configuration is invalid
    /// Returns `EngineError::FileSystem` if the database path is invalid
    /// Returns `EngineError::Database` if database initialization fails
    pub async fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let db_path = if let Some(path) = self.database_path {
            path
        } else {
            Self::default_database_path()?
        };

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::FileSystem {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let db_path_clone = db_path.clone();
        let recovered = task::spawn_blocking(move || {
            let mut db = Database::new(&db_path_clone)?;
            db.recover_interrupted_plans()
        })
        .await
        .map_err(EngineError::join)??;

        for plan_id in &recovered {
            warn!("[PlanExec] Plan #{plan_id} was interrupted by a restart; marked partially completed");
        }
        info!("[Engine] Opened database at {}", db_path.display());

        Ok(Engine {
            db_path,
            resolver: ScopeResolver::new(&self.config.session),
            config: Arc::new(self.config),
            events: EventBus::new(),
            executions: ExecutionRegistry::new(),
            step_executor: self
                .step_executor
                .unwrap_or_else(|| Arc::new(UnavailableStepExecutor)),
            work_runner: self
                .work_runner
                .unwrap_or_else(|| Arc::new(UnavailableWorkRunner)),
            tick_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the default database path following XDG Base Directory
    /// specification.
    fn default_database_path() -> Result<PathBuf> {
        xdg::BaseDirectories::with_prefix("cadence")
            .place_data_file("cadence.db")
            .map_err(|e| EngineError::XdgDirectory(e.to_string()))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
