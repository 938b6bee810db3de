//! Hostwarden CLI Binary
//!
//! Loads settings, initialises logging and executes one command.

use anyhow::Context;
use clap::Parser;
use hostwarden::logging::init_logging;
use hostwarden::tooling::cli::{Cli, CliContext};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(cli.config.clone(), &cli.caller)
        .context("Error loading configuration")?;

    let logging = cli.logging_config(&context.settings().logging);
    init_logging(Some(&logging)).context("Error initializing logging")?;

    let output = context.execute(&cli.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
