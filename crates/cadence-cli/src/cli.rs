//! Drives the command router from the terminal.

use std::process::ExitCode;

use anyhow::{Context, Result};
use cadence_core::{
    display::{Goals, Schedules},
    CommandRouter, Engine, EngineEvent, Scope,
};
use log::{info, warn};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::renderer::TerminalRenderer;

pub struct Cli {
    engine: Engine,
    router: CommandRouter,
    renderer: TerminalRenderer,
}

/// Text to show for an event, if it concerns this conversation.
///
/// With `all_milestones`, milestones from every conversation are shown.
fn describe_event(event: &EngineEvent, scope: &Scope, all_milestones: bool) -> Option<String> {
    let followed = all_milestones && matches!(event, EngineEvent::Milestone { .. });
    if event.scope() != scope && !followed {
        return None;
    }
    match event {
        EngineEvent::PlanReady {
            plan_id,
            title,
            step_count,
            actions,
            ..
        } => {
            let actions: Vec<String> = actions
                .iter()
                .map(|a| format!("`plan {} {plan_id}`", a.as_str()))
                .collect();
            Some(format!(
                "Plan #{plan_id} '{title}' ({step_count} steps) is ready: {}",
                actions.join(" or ")
            ))
        }
        EngineEvent::PlanExecutionFinished { summary, .. } => Some(summary.clone()),
        EngineEvent::Milestone { message, .. } => Some(format!("🏁 {message}")),
        EngineEvent::ScheduleFired {
            schedule_id,
            target,
            acted: false,
            ..
        } => Some(format!(
            "Schedule #{schedule_id} fired for {target} but found nothing to do"
        )),
        _ => None,
    }
}

impl Cli {
    pub fn new(engine: Engine, router: CommandRouter, renderer: TerminalRenderer) -> Self {
        Self {
            engine,
            router,
            renderer,
        }
    }

    /// Runs one command, waits for any plan run it started, and prints the
    /// reply followed by the run summaries.
    pub async fn exec(&self, line: &str) -> Result<ExitCode> {
        let mut events = self.engine.subscribe();
        let result = self.router.dispatch(line).await;

        if !result.success {
            self.renderer.render_error(&result.message);
            return Ok(ExitCode::FAILURE);
        }
        self.renderer.render(&result.message);

        self.engine.wait_for_idle().await;
        let scope = self.router.session().scope();
        loop {
            match events.try_recv() {
                Ok(EngineEvent::PlanExecutionFinished { summary, .. }) => {
                    println!();
                    self.renderer.render(&summary);
                }
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        info!("[Cli] Finished `{line}` in {scope}");
        Ok(ExitCode::SUCCESS)
    }

    /// Prints every goal and schedule across all conversations.
    pub async fn overview(&self) -> Result<ExitCode> {
        let overview = self
            .engine
            .dashboard_overview()
            .await
            .context("Failed to load overview")?;
        self.renderer.render(&format!(
            "# Goals\n\n{}\n# Schedules\n\n{}",
            Goals(overview.goals),
            Schedules(overview.schedules)
        ));
        Ok(ExitCode::SUCCESS)
    }

    /// Interactive loop: stdin commands in, replies and engine events out.
    pub async fn run(&self) -> Result<ExitCode> {
        let scheduler = self.engine.start_scheduler();
        let printer = {
            let mut events = self.engine.subscribe();
            let renderer = self.renderer.clone();
            let scope = self.router.session().scope().clone();
            tokio::spawn(async move {
                // Switching auto mode on here routes milestones here.
                let mut all_milestones = false;
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if let EngineEvent::AutoModeChanged { scope: from, enabled } = &event {
                                if *from == scope {
                                    all_milestones = *enabled;
                                }
                            }
                            if let Some(text) = describe_event(&event, &scope, all_milestones) {
                                renderer.render(&text);
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!("[Cli] Dropped {missed} engine events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        self.renderer.render(&format!(
            "Cadence ready in {}. Type `help` for commands, Ctrl-D to quit.",
            self.router.session().scope()
        ));

        let mut lines = BufReader::new(io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read stdin")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                break;
            }

            let result = self.router.dispatch(line).await;
            if result.success {
                self.renderer.render(&result.message);
            } else {
                self.renderer.render_error(&result.message);
            }
        }

        if let Some(handle) = scheduler {
            handle.shutdown().await;
        }
        self.engine.wait_for_idle().await;
        printer.abort();
        Ok(ExitCode::SUCCESS)
    }
}
