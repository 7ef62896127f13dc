//! Local capabilities the terminal channel plugs into the engine.

use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{Goal, StepExecutor, StepOutcome, StepRequest, Task, TaskRunOutcome, WorkRunner};
use log::debug;
use tokio::process::Command;

const SHELL_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs plan steps with the `shell` and `echo` tools.
///
/// `shell` reads its command from the `command` argument, falling back to
/// `input` (what `plan add` stores). `echo` returns its input unchanged.
pub struct ShellStepExecutor;

fn argument<'a>(request: &'a StepRequest, key: &str) -> Option<&'a str> {
    request.arguments.get(key).and_then(serde_json::Value::as_str)
}

impl ShellStepExecutor {
    async fn run_shell(command: &str) -> StepOutcome {
        debug!("[Shell] Running: {command}");
        let child = Command::new("sh").arg("-c").arg(command).kill_on_drop(true).output();

        let output = match tokio::time::timeout(SHELL_TIMEOUT, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return StepOutcome::Failed {
                    error: format!("Failed to start shell: {e}"),
                }
            }
            Err(_) => {
                return StepOutcome::NoResponse {
                    detail: format!("command did not finish within {}s", SHELL_TIMEOUT.as_secs()),
                }
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.success() {
            StepOutcome::Completed {
                output: if stdout.is_empty() {
                    "(no output)".to_string()
                } else {
                    stdout
                },
            }
        } else {
            let error = if stderr.is_empty() {
                format!("Command exited with {}", output.status)
            } else {
                stderr
            };
            StepOutcome::Failed { error }
        }
    }
}

#[async_trait]
impl StepExecutor for ShellStepExecutor {
    async fn execute(&self, request: StepRequest) -> StepOutcome {
        match request.tool_name.as_str() {
            "shell" => match argument(&request, "command").or_else(|| argument(&request, "input")) {
                Some(command) => Self::run_shell(command).await,
                None => StepOutcome::Failed {
                    error: "shell requires a `command` argument".to_string(),
                },
            },
            "echo" => StepOutcome::Completed {
                output: argument(&request, "input")
                    .unwrap_or(&request.description)
                    .to_string(),
            },
            other => StepOutcome::Failed {
                error: format!("Tool not found: {other}"),
            },
        }
    }
}

/// Announces scheduled work on stdout and leaves it to the operator.
pub struct ConsoleWorkRunner;

#[async_trait]
impl WorkRunner for ConsoleWorkRunner {
    async fn run_task(&self, goal: &Goal, task: &Task) -> TaskRunOutcome {
        println!(
            "⏰ Scheduled task #{} '{}' of goal #{} '{}' is in progress",
            task.id, task.title, goal.id, goal.title
        );
        TaskRunOutcome::Dispatched
    }

    async fn plan_goal(&self, goal: &Goal) -> TaskRunOutcome {
        println!(
            "⏰ Goal #{} '{}' has no tasks yet; add some with `tasks add {} <title>`",
            goal.id, goal.title, goal.id
        );
        TaskRunOutcome::Dispatched
    }
}
