//! Entry point for the LockBank administrative tool.
//!
//! Loads configuration, initializes logging and metric descriptions,
//! assembles the lock and ledger stack and runs one subcommand.

use clap::Parser;
use lockbank_common::AppError;
use lockbank_server::{Cli, Configuration, admin, build_stack, metrics, startup};
use tracing::info;

async fn run(cli: Cli) -> anyhow::Result<()> {
    let configuration = Configuration::from_cli(&cli)?;

    let logging_config = configuration.logging_config();
    let _logging_guard = startup::init_logging(&logging_config)?;

    metrics::init_metrics();

    let stack = build_stack(&configuration).await?;
    info!(
        provider = %stack.locks.current_provider(),
        command = ?cli.command,
        "LockBank stack ready"
    );

    let output = admin::execute(&cli.command, &stack).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    run(Cli::parse()).await?;
    Ok(())
}
