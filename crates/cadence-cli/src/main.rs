//! Cadence CLI Application
//!
//! Local terminal channel for the cadence work orchestration engine.

mod args;
mod cli;
mod renderer;
mod tools;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use args::{Args, Commands};
use cadence_core::{config, CommandRouter, EngineBuilder, EngineConfig};
use clap::Parser;
use cli::Cli;
use log::info;
use renderer::TerminalRenderer;
use tools::{ConsoleWorkRunner, ShellStepExecutor};

fn load_engine_config(args: &Args) -> Result<EngineConfig> {
    let path = args.config.clone().or_else(config::default_config_path);
    match path {
        Some(path) => config::load_config(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::init();

    let args = Args::parse();
    let config = load_engine_config(&args)?;

    let engine = EngineBuilder::new()
        .with_database_path(args.database_file.as_ref())
        .with_config(config)
        .with_step_executor(Arc::new(ShellStepExecutor))
        .with_work_runner(Arc::new(ConsoleWorkRunner))
        .build()
        .await
        .context("Failed to initialize engine")?;

    let chat = engine
        .for_channel(&args.channel, args.conversation.as_deref())
        .context("Failed to resolve conversation")?;
    let cli = Cli::new(
        engine,
        CommandRouter::new(chat),
        TerminalRenderer::new(!args.no_color),
    );

    info!("Cadence started");

    match args.command {
        Some(Commands::Exec { words }) => cli.exec(&words.join(" ")).await,
        Some(Commands::Run) => cli.run().await,
        Some(Commands::Overview) => cli.overview().await,
        None => cli.exec("help").await,
    }
}
