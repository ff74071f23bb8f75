//! SILL CLI Binary

use anyhow::Context;
use clap::Parser;
use sill::logging::init_logging;
use sill::tooling::{Cli, CliContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config().context("Failed to load configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let context = CliContext::new(config).context("Failed to open catalog store")?;
    let output = context.execute(&cli.command).await?;
    println!("{}", output);
    Ok(())
}
