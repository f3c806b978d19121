//! CLI entry point for digest-hub.

use anyhow::Result;
use clap::Parser;
use digest_hub::adapter::build_default_adapter_registry;
use tracing::{debug, info};

mod app_config;
mod cli;
mod commands;

use app_config::{Settings, load_config};
use cli::{Cli, Command};
use commands::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    if let Command::Adapters { json } = cli.command {
        return commands::run_adapters_command(&build_default_adapter_registry(), json);
    }

    let loaded = load_config(cli.config.as_deref())?;
    if let Some(path) = loaded.path.as_deref()
        && loaded.loaded_from_file()
    {
        debug!(path = %path.display(), "config file loaded");
    }
    let settings = Settings::resolve(loaded.config.as_ref(), cli.db.clone());
    info!(database = %settings.database_path.display(), "digest-hub starting");

    let ctx = AppContext::open(settings).await?;
    let result = match cli.command {
        Command::Serve => commands::run_serve_command(&ctx).await,
        Command::Source(command) => commands::run_source_command(&ctx, command).await,
        Command::Fetch { id } => commands::run_fetch_command(&ctx, &id).await,
        Command::Search(args) => commands::run_search_command(&ctx, &args).await,
        Command::Import { file } => commands::run_import_command(&ctx, &file).await,
        Command::Process { limit } => commands::run_process_command(&ctx, limit).await,
        Command::Adapters { json } => commands::run_adapters_command(&ctx.adapters, json),
    };
    ctx.db.close().await;
    result
}
