//! Permission grant CLI commands.

use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use super::{Cli, NodeKind};
use crate::output::{self, OutputFormat};
use canopy_core::error::AppError;
use canopy_entity::permission::{PermissionGrant, PermissionLevel};
use canopy_entity::user::Principal;
use canopy_service::GrantRequest;

/// Arguments for permission commands
#[derive(Debug, Args)]
pub struct PermissionArgs {
    /// Permission subcommand
    #[command(subcommand)]
    pub command: PermissionCommand,
}

/// Access level accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelArg {
    /// Read access
    Read,
    /// Read and write access
    Write,
}

impl From<LevelArg> for PermissionLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Read => PermissionLevel::Read,
            LevelArg::Write => PermissionLevel::Write,
        }
    }
}

/// Permission subcommands
#[derive(Debug, Subcommand)]
pub enum PermissionCommand {
    /// Grant a user access to a node and everything below it
    Grant {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
        /// User receiving access
        #[arg(short, long)]
        user: Uuid,
        /// Access level
        #[arg(short, long, value_enum)]
        level: LevelArg,
    },
    /// Change the level of an existing grant
    Change {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
        /// User holding the grant
        #[arg(short, long)]
        user: Uuid,
        /// New access level
        #[arg(short, long, value_enum)]
        level: LevelArg,
    },
    /// Revoke a user's access to a node
    Revoke {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
        /// User losing access
        #[arg(short, long)]
        user: Uuid,
    },
    /// Check whether a user holds a level on a node
    Check {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
        /// Required level
        #[arg(short, long, value_enum)]
        level: LevelArg,
        /// User to check (defaults to the acting user)
        #[arg(short, long)]
        user: Option<Uuid>,
    },
    /// List the grants on a node
    List {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
    },
}

/// Grant display row
#[derive(Debug, Serialize, Tabled)]
struct GrantRow {
    /// User ID
    user_id: String,
    /// Level
    level: String,
    /// Granted on
    source_id: String,
    /// Explicit or inherited
    origin: &'static str,
    /// Granted by
    granted_by: String,
}

impl From<&PermissionGrant> for GrantRow {
    fn from(g: &PermissionGrant) -> Self {
        Self {
            user_id: g.user_id.to_string(),
            level: g.level.to_string(),
            source_id: g.source_id.to_string(),
            origin: if g.is_explicit() { "explicit" } else { "inherited" },
            granted_by: g.granted_by.to_string(),
        }
    }
}

/// Execute permission commands
pub async fn execute(args: &PermissionArgs, cli: &Cli) -> Result<(), AppError> {
    let services = super::open_services(&cli.config).await?;
    let permissions = &services.permissions;
    let ctx = cli.context()?;

    match &args.command {
        PermissionCommand::Grant {
            kind,
            id,
            user,
            level,
        } => {
            let report = permissions
                .grant(
                    &ctx,
                    GrantRequest {
                        target: kind.node(*id),
                        user_id: *user,
                        level: (*level).into(),
                    },
                )
                .await?;
            output::print_success(&format!(
                "Granted {} to {} ({} node(s) updated, {} kept their own grant)",
                PermissionLevel::from(*level),
                user,
                report.created,
                report.skipped
            ));
        }
        PermissionCommand::Change {
            kind,
            id,
            user,
            level,
        } => {
            let report = permissions
                .change(
                    &ctx,
                    GrantRequest {
                        target: kind.node(*id),
                        user_id: *user,
                        level: (*level).into(),
                    },
                )
                .await?;
            output::print_success(&format!(
                "Changed grant of {} to {} ({} node(s) updated)",
                user,
                PermissionLevel::from(*level),
                report.created + report.updated
            ));
        }
        PermissionCommand::Revoke { kind, id, user } => {
            let report = permissions.revoke(&ctx, kind.node(*id), *user).await?;
            if report.removed == 0 {
                output::print_warning(&format!("{} held no grant here", user));
            } else {
                output::print_success(&format!(
                    "Revoked access of {} ({} grant(s) removed)",
                    user, report.removed
                ));
            }
        }
        PermissionCommand::Check {
            kind,
            id,
            level,
            user,
        } => {
            let principal = match user {
                Some(user) => Principal::user(*user),
                None => ctx.principal,
            };
            let decision = permissions
                .check(&principal, kind.node(*id), (*level).into())
                .await?;
            match cli.format {
                OutputFormat::Json => output::print_item(&decision, cli.format),
                OutputFormat::Table => {
                    if decision.is_allowed() {
                        output::print_success("Allowed");
                    } else {
                        output::print_warning("Denied");
                    }
                }
            }
        }
        PermissionCommand::List { kind, id } => {
            let grants = permissions.list_grants(&ctx, kind.node(*id)).await?;
            let rows: Vec<GrantRow> = grants.iter().map(GrantRow::from).collect();
            output::print_list(&rows, cli.format);
        }
    }

    Ok(())
}
