#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cadence_core::{
    Engine, EngineBuilder, EngineConfig, Goal, StepExecutor, StepOutcome, StepRequest, Task,
    TaskRunOutcome, WorkRunner,
};
use tempfile::TempDir;

/// Step executor that answers from a script keyed by step description.
///
/// Unscripted steps complete with `done: <description>`. Every request is
/// recorded in call order.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<HashMap<String, StepOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn respond(&self, description: &str, outcome: StepOutcome) {
        self.script
            .lock()
            .unwrap()
            .insert(description.to_string(), outcome);
    }

    pub fn clear(&self, description: &str) {
        self.script.lock().unwrap().remove(description);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, request: StepRequest) -> StepOutcome {
        self.calls.lock().unwrap().push(request.description.clone());
        if request.description == "explode" {
            panic!("executor blew up");
        }
        self.script
            .lock()
            .unwrap()
            .get(&request.description)
            .cloned()
            .unwrap_or(StepOutcome::Completed {
                output: format!("done: {}", request.description),
            })
    }
}

/// Work runner that records what the scheduler handed it.
pub struct RecordingRunner {
    pub outcome: Mutex<TaskRunOutcome>,
    pub tasks: Mutex<Vec<u64>>,
    pub planned_goals: Mutex<Vec<u64>>,
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(TaskRunOutcome::Completed {
                result: "worked on it".to_string(),
            }),
            tasks: Mutex::new(Vec::new()),
            planned_goals: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingRunner {
    pub fn task_calls(&self) -> Vec<u64> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn goal_calls(&self) -> Vec<u64> {
        self.planned_goals.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkRunner for RecordingRunner {
    async fn run_task(&self, _goal: &Goal, task: &Task) -> TaskRunOutcome {
        self.tasks.lock().unwrap().push(task.id);
        self.outcome.lock().unwrap().clone()
    }

    async fn plan_goal(&self, goal: &Goal) -> TaskRunOutcome {
        self.planned_goals.lock().unwrap().push(goal.id);
        TaskRunOutcome::Dispatched
    }
}

pub struct TestEngine {
    pub engine: Engine,
    pub executor: Arc<ScriptedExecutor>,
    pub runner: Arc<RecordingRunner>,
    pub temp_dir: TempDir,
}

/// Helper function to create a test engine with default configuration
pub async fn create_test_engine() -> TestEngine {
    create_test_engine_with(EngineConfig::default()).await
}

pub async fn create_test_engine_with(config: EngineConfig) -> TestEngine {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let executor = Arc::new(ScriptedExecutor::default());
    let runner = Arc::new(RecordingRunner::default());
    let engine = EngineBuilder::new()
        .with_database_path(Some(temp_dir.path().join("test.db")))
        .with_config(config)
        .with_step_executor(executor.clone())
        .with_work_runner(runner.clone())
        .build()
        .await
        .expect("Failed to create engine");
    TestEngine {
        engine,
        executor,
        runner,
        temp_dir,
    }
}

impl TestEngine {
    pub fn db_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("test.db")
    }

    /// Opens a second engine on the same database, as a restart would.
    pub async fn reopen(&self) -> Engine {
        EngineBuilder::new()
            .with_database_path(Some(self.db_path()))
            .with_step_executor(self.executor.clone())
            .with_work_runner(self.runner.clone())
            .build()
            .await
            .expect("Failed to reopen engine")
    }
}
