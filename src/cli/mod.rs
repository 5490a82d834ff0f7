// src/cli/mod.rs — CLI definition (clap derive)

pub mod check;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spaceport", about = "Multi-tenant plugin server", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level when neither SPACEPORT_LOG nor RUST_LOG is set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Boot the server: install plugins, start spaces, wait for Ctrl-C
    Serve {
        /// Plugin directory (overrides plugins.home)
        #[arg(long)]
        plugins: Option<String>,
    },
    /// Validate every plugin descriptor under a directory
    Check {
        /// Directory holding plugin units
        dir: String,
    },
}
