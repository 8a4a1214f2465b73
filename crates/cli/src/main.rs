mod app;
mod cli;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::error;

use rx_core::config::{load_dotenv, Config};

use crate::cli::CliArgs;
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = Config::from_env();
    config.log_summary();

    let terminal = Arc::new(Terminal::new());
    let orchestrator = app::build_orchestrator(&config, &args, terminal.clone())
        .await
        .context("failed to start")?;

    let targets: Vec<String> = orchestrator.descriptors().into_iter().map(|d| d.id).collect();
    terminal.print_banner(config.profile_label(), &config.llm.model, &targets)?;

    let user_id = args
        .user_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session_id = orchestrator.start_session().await;
    terminal.print_info(&format!("Session: {}", session_id))?;

    // REPL loop
    loop {
        let input = match terminal.read_input()? {
            Some(text) => text,
            None => {
                terminal.print_info("Goodbye.")?;
                break;
            }
        };
        if input.is_empty() {
            continue;
        }

        terminal.reset_stream();
        match orchestrator.route_request(&input, &user_id, &session_id).await {
            Ok(response) => terminal.print_response(&response)?,
            Err(e) => {
                error!(error = %e, kind = e.kind(), "request failed");
                terminal.print_error(&e.to_string())?;
            }
        }
    }

    for team in orchestrator.teams() {
        team.teardown();
    }
    Ok(())
}
