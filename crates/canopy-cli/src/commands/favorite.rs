//! Favorite marker CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use super::{Cli, NodeKind};
use crate::output;
use canopy_core::error::AppError;

/// Arguments for favorite commands
#[derive(Debug, Args)]
pub struct FavoriteArgs {
    /// Favorite subcommand
    #[command(subcommand)]
    pub command: FavoriteCommand,
}

/// Favorite subcommands
#[derive(Debug, Subcommand)]
pub enum FavoriteCommand {
    /// Mark a node as favorite
    Add {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
    },
    /// Remove a favorite marker
    Remove {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
    },
    /// List the acting user's favorites
    List,
}

/// Favorite display row
#[derive(Debug, Serialize, Tabled)]
struct FavoriteRow {
    /// Kind
    kind: String,
    /// Node ID
    id: String,
    /// Path
    path: String,
    /// Marked at
    marked_at: String,
}

/// Execute favorite commands
pub async fn execute(args: &FavoriteArgs, cli: &Cli) -> Result<(), AppError> {
    let services = super::open_services(&cli.config).await?;
    let ctx = cli.context()?;

    match &args.command {
        FavoriteCommand::Add { kind, id } => {
            if services.favorites.mark(&ctx, kind.node(*id)).await? {
                output::print_success("Marked as favorite");
            } else {
                output::print_warning("Already a favorite");
            }
        }
        FavoriteCommand::Remove { kind, id } => {
            if services.favorites.unmark(&ctx, kind.node(*id)).await? {
                output::print_success("Favorite removed");
            } else {
                output::print_warning("Not a favorite");
            }
        }
        FavoriteCommand::List => {
            let favorites = services.favorites.list(&ctx).await?;
            let mut rows = Vec::with_capacity(favorites.len());
            for fav in &favorites {
                let path = services.paths.display_path(fav.target()).await?;
                rows.push(FavoriteRow {
                    kind: fav.target_type.to_string(),
                    id: fav.target_id.to_string(),
                    path,
                    marked_at: fav.created_at.format("%Y-%m-%d %H:%M").to_string(),
                });
            }
            output::print_list(&rows, cli.format);
        }
    }

    Ok(())
}
