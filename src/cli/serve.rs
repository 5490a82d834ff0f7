// src/cli/serve.rs — Run a server until interrupted

use std::path::PathBuf;

use crate::infra::config::Config;
use crate::server::Server;

pub async fn run_serve(mut config: Config, plugins: Option<String>) -> anyhow::Result<()> {
    if let Some(dir) = plugins {
        config.plugins.home = Some(PathBuf::from(dir));
    }

    let server = Server::builder(config).build();
    server.boot()?;
    println!(
        "spaceport {} serving {} space(s) with {} plugin(s). Ctrl-C to stop.",
        server.id(),
        server.spaces().names().len(),
        server.plugins().len()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, shutting down");
    server.shutdown().await;
    Ok(())
}
