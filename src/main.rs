// ABOUTME: Entry point for the slipway CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::App;
use slipway::config;
use slipway::error::Result;
use slipway::output::Output;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.output_mode());

    if let Err(e) = run(cli, output.clone()).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    if let Commands::Init { site, repo, force } = &cli.command {
        let cwd = env::current_dir()?;
        config::init_config(&cwd, site.as_deref(), repo.as_deref(), *force)?;
        output.success(&format!("Created {}", config::CONFIG_FILENAME));
        return Ok(());
    }

    let app = App::open(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Deploy { site } => commands::deploy(&app, &site, output).await,
        Commands::Stop { site } => commands::stop(&app, &site, output).await,
        Commands::Status => commands::status(&app, output).await,
        Commands::Session { command } => commands::session(&app, command, output).await,
        Commands::Sweep => commands::sweep(&app, output).await,
        Commands::Serve => commands::serve(&app, output).await,
    }
}
