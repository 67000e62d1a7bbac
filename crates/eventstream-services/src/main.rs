//! Runs publisher and reader steps against the configured event hub.

mod cli;
mod handlers;
mod services;

use clap::Parser;
use eventstream_core::config;
use eventstream_core::observability::init_observability;

use crate::cli::Cli;
use crate::services::Services;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)?;
    }
    config::init();
    init_observability();

    let services = Services::from_lookup(config::env_lookup)?;
    for step in &cli.steps {
        let reply = services.execute(step).await;
        println!("{reply}");
    }
    Ok(())
}
