//! Intentbus CLI Binary
//!
//! Runs an intent resolution agent or inspects one offline.

use anyhow::Context;
use clap::Parser;
use intentbus::logging::init_logging;
use intentbus::tooling::cli::{Cli, CliContext};
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut context =
        CliContext::new(cli.config.clone()).context("Failed to load configuration")?;
    context.apply_logging_overrides(&cli);
    init_logging(Some(&context.settings().logging)).context("Failed to initialize logging")?;

    let output = context.execute(&cli.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
