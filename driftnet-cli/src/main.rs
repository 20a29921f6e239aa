//! ## driftnet-cli
//! **Operational entrypoint for the telemetry collector**
//!
//! - `driftnet listen` runs the collector until Ctrl-C, reloading its
//!   configuration on `SIGHUP`
//! - `driftnet check-config` validates and prints the effective configuration

use clap::Parser;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Listen(args) => commands::listen(args).await,
        Commands::CheckConfig(args) => commands::check_config(args),
    }
}
