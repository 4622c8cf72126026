mod cli;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;
use std::process;
use tracing::error;

use crate::{
    cli::{Args, Commands, SettingsCommand},
    commands::CommandExecutor,
};
use loantrek::config::AppConfig;
use loantrek::logging::{self, Verbosity};

#[tokio::main]
async fn main() {
    // Load .env before clap reads `env` defaults.
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    loantrek::api::install_rustls_provider();

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }
    if let Some(state_file) = args.state_file {
        config.state_file = state_file;
    }
    config.validate().context("Invalid configuration")?;

    let _guard = logging::init_logging(
        config.log_dir.as_deref(),
        Verbosity::from_flags(args.verbose, args.quiet),
    )?;

    let executor = CommandExecutor::new(config)?;

    match args.command {
        Commands::Status { json } => executor.status(json).await,
        Commands::Watch => executor.watch().await,
        Commands::MarkRead { id } => executor.mark_read(&id).await,
        Commands::MarkAllRead => executor.mark_all_read().await,
        Commands::ClearRead => executor.clear_read().await,
        Commands::Settings { action } => match action {
            SettingsCommand::Show => executor.show_settings().await,
            SettingsCommand::SetInterval { hours } => executor.set_interval(hours).await,
            SettingsCommand::Presets => executor.presets().await,
        },
        Commands::Stats { json } => executor.stats(json).await,
    }
}
