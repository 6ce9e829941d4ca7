//! stackwise - Main Entry Point

use clap::Parser;
use stackwise::cli::{cmd_build, cmd_invalidate, cmd_list, cmd_plan, load_config, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackwise=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cmd_list()?,
        Commands::Plan { model } => cmd_plan(&model)?,
        Commands::Build {
            models,
            data_dir,
            cache_dir,
            output,
            best_effort,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_build(config, &models, &data_dir, &cache_dir, output.as_deref(), best_effort)?;
        }
        Commands::Invalidate { model, cache_dir } => cmd_invalidate(&model, &cache_dir)?,
    }

    Ok(())
}
