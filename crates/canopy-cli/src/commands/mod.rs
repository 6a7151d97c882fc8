//! CLI command definitions and dispatch.

pub mod favorite;
pub mod file;
pub mod folder;
pub mod migrate;
pub mod permission;
pub mod repair;

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::output::OutputFormat;
use canopy_core::config::{AppConfig, DatabaseBackend};
use canopy_core::error::AppError;
use canopy_database::{DatabasePool, MemoryTreeStore, PgTreeStore, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::user::Principal;
use canopy_service::{RequestContext, Services};
use canopy_storage::LocalStorageProvider;

/// Canopy: hierarchical folder trees with inherited access control
#[derive(Debug, Parser)]
#[command(name = "canopy", version, about, long_about = None)]
pub struct Cli {
    /// Configuration environment (loads config/default.toml and config/<env>.toml)
    #[arg(short, long, env = "CANOPY_ENV", default_value = "development")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Act as this user
    #[arg(long, global = true)]
    pub as_user: Option<Uuid>,

    /// Act with unrestricted administrator scope
    #[arg(long, global = true)]
    pub admin: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Folder management
    Folder(folder::FolderArgs),
    /// File management
    File(file::FileArgs),
    /// Permission grants
    Perm(permission::PermissionArgs),
    /// Favorite markers
    Favorite(favorite::FavoriteArgs),
    /// Storage repair
    Repair(repair::RepairArgs),
    /// Database migration management
    Migrate(migrate::MigrateArgs),
}

/// Kind of node addressed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NodeKind {
    /// A folder
    Folder,
    /// A file
    File,
}

impl NodeKind {
    /// Pair the kind with an ID
    pub fn node(self, id: Uuid) -> NodeRef {
        match self {
            Self::Folder => NodeRef::Folder(id),
            Self::File => NodeRef::File(id),
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Folder(args) => folder::execute(args, self).await,
            Commands::File(args) => file::execute(args, self).await,
            Commands::Perm(args) => permission::execute(args, self).await,
            Commands::Favorite(args) => favorite::execute(args, self).await,
            Commands::Repair(args) => repair::execute(args, &self.config).await,
            Commands::Migrate(args) => migrate::execute(args, &self.config).await,
        }
    }

    /// Request context for the acting principal
    pub fn context(&self) -> Result<RequestContext, AppError> {
        let user_id = self
            .as_user
            .ok_or_else(|| AppError::validation("--as-user <UUID> is required for this command"))?;
        let principal = if self.admin {
            Principal::unrestricted_admin(user_id)
        } else {
            Principal::user(user_id)
        };
        Ok(RequestContext::new(principal))
    }
}

/// Helper: load configuration for an environment
pub fn load_config(env: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(env)
}

/// Helper: open the configured tree store
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn TreeStore>, AppError> {
    match config.database.backend {
        DatabaseBackend::Postgres => {
            let pool = DatabasePool::connect(&config.database).await?;
            Ok(Arc::new(PgTreeStore::new(pool.into_pool())))
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using the in-memory tree store; changes end with this process");
            Ok(Arc::new(MemoryTreeStore::new()))
        }
    }
}

/// Helper: wire every service from configuration
pub async fn open_services(config_env: &str) -> Result<Services, AppError> {
    let config = load_config(config_env)?;
    let store = open_store(&config).await?;
    let objects = Arc::new(LocalStorageProvider::new(&config.storage.root_path).await?);
    Ok(Services::new(store, objects, &config))
}
