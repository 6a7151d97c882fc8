//! Database migration management commands.

use clap::{Args, Subcommand};

use crate::output;
use canopy_core::config::DatabaseBackend;
use canopy_core::error::AppError;
use canopy_database::DatabasePool;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Check database connectivity
    Status,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config_env: &str) -> Result<(), AppError> {
    let config = super::load_config(config_env)?;
    if config.database.backend != DatabaseBackend::Postgres {
        output::print_warning("The in-memory backend has no schema to migrate.");
        return Ok(());
    }
    let pool = DatabasePool::connect(&config.database).await?;

    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            canopy_database::migration::run_migrations(pool.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Status => {
            if pool.health_check().await? {
                output::print_success("Database reachable.");
            } else {
                output::print_warning("Database responded unexpectedly.");
            }
        }
    }

    pool.close().await;
    Ok(())
}
