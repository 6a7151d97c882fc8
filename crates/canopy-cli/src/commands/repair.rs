//! Storage repair CLI commands.

use std::sync::Arc;

use clap::{Args, Subcommand};

use crate::output;
use canopy_core::error::AppError;
use canopy_worker::RepairRunner;

/// Arguments for repair commands
#[derive(Debug, Args)]
pub struct RepairArgs {
    /// Repair subcommand
    #[command(subcommand)]
    pub command: RepairCommand,
}

/// Repair subcommands
#[derive(Debug, Subcommand)]
pub enum RepairCommand {
    /// Process one batch of pending repair tickets
    Run {
        /// Tickets per batch (defaults to the configured batch size)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
}

/// Execute repair commands
pub async fn execute(args: &RepairArgs, config_env: &str) -> Result<(), AppError> {
    let mut config = super::load_config(config_env)?;

    match &args.command {
        RepairCommand::Run { batch_size } => {
            if let Some(size) = batch_size {
                config.repair.batch_size = *size;
            }
            let services = super::open_services(config_env).await?;
            let runner = RepairRunner::new(
                Arc::new(services.repairs),
                config.repair.clone(),
                "cli".to_string(),
            );

            let report = runner.run_once().await?;
            output::print_kv("Attempted", &report.attempted.to_string());
            output::print_kv("Resolved", &report.resolved.to_string());
            output::print_kv("Failed", &report.failed.to_string());
            if report.failed > 0 {
                output::print_warning("Some tickets failed again and stay queued");
            } else {
                output::print_success("Repair pass complete");
            }
        }
    }

    Ok(())
}
