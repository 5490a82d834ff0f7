// src/main.rs — Spaceport entry point

use clap::Parser;

use spaceport::cli::{Cli, Commands};
use spaceport::infra::config::Config;
use spaceport::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Commands::Serve { plugins } => spaceport::cli::serve::run_serve(config, plugins).await,
        Commands::Check { dir } => spaceport::cli::check::run_check(&dir),
    }
}
