//! Folder management CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use super::{Cli, NodeKind};
use crate::output::{self, OutputFormat};
use canopy_core::error::AppError;
use canopy_core::types::pagination::PageRequest;
use canopy_entity::NodeRef;
use canopy_entity::folder::{Folder, FolderNode};
use canopy_service::ChildEntry;

/// Arguments for folder commands
#[derive(Debug, Args)]
pub struct FolderArgs {
    /// Folder subcommand
    #[command(subcommand)]
    pub command: FolderCommand,
}

/// Folder subcommands
#[derive(Debug, Subcommand)]
pub enum FolderCommand {
    /// Create the root folder of a new user
    Provision {
        /// User receiving the root
        #[arg(short, long)]
        user: Uuid,
    },
    /// Show a user's root folder
    Root {
        /// Owner of the root
        #[arg(short, long)]
        user: Uuid,
    },
    /// Show one folder
    Get {
        /// Folder ID
        id: Uuid,
    },
    /// List the direct children of a folder
    List {
        /// Folder ID
        id: Uuid,
        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u64,
        /// Items per page
        #[arg(long, default_value = "50")]
        page_size: u64,
    },
    /// Create a new folder
    Create {
        /// Parent folder ID
        #[arg(short, long)]
        parent: Uuid,
        /// Folder name
        #[arg(short, long)]
        name: String,
    },
    /// Rename a folder
    Rename {
        /// Folder ID
        id: Uuid,
        /// New name
        #[arg(short, long)]
        name: String,
    },
    /// Move a folder under another folder
    Move {
        /// Folder ID
        id: Uuid,
        /// Destination folder ID
        #[arg(short, long)]
        to: Uuid,
    },
    /// Delete folders with everything below them
    Delete {
        /// Folder IDs
        #[arg(required = true)]
        ids: Vec<Uuid>,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Show the folder tree below a folder
    Tree {
        /// Folder ID
        id: Uuid,
    },
    /// Show the display path of a node
    Path {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
    },
    /// Show the storage address of a node
    Address {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
    },
    /// Show subtree statistics of a node
    Size {
        /// Node kind
        #[arg(value_enum)]
        kind: NodeKind,
        /// Node ID
        id: Uuid,
    },
    /// Recompute subtree statistics from the live tree and fix drift
    Recompute {
        /// Folder ID
        id: Uuid,
    },
}

/// Folder display row
#[derive(Debug, Serialize, Tabled)]
struct FolderRow {
    /// Folder ID
    id: String,
    /// Name
    name: String,
    /// Owner
    owner_id: String,
    /// Size
    size: String,
    /// Files below
    files: i64,
    /// Folders below
    folders: i64,
    /// Created at
    created_at: String,
}

impl From<&Folder> for FolderRow {
    fn from(f: &Folder) -> Self {
        Self {
            id: f.id.to_string(),
            name: if f.is_root() { "/".to_string() } else { f.name.clone() },
            owner_id: f.owner_id.to_string(),
            size: output::format_bytes(f.subtree_bytes.max(0) as u64),
            files: f.subtree_files,
            folders: f.subtree_folders,
            created_at: f.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Child listing row
#[derive(Debug, Serialize, Tabled)]
struct ChildRow {
    /// Kind
    kind: &'static str,
    /// ID
    id: String,
    /// Name
    name: String,
    /// Size
    size: String,
}

impl From<&ChildEntry> for ChildRow {
    fn from(entry: &ChildEntry) -> Self {
        match entry {
            ChildEntry::Folder(f) => Self {
                kind: "folder",
                id: f.id.to_string(),
                name: format!("{}/", f.name),
                size: output::format_bytes(f.subtree_bytes.max(0) as u64),
            },
            ChildEntry::File(f) => Self {
                kind: "file",
                id: f.id.to_string(),
                name: f.name.clone(),
                size: output::format_bytes(f.size_bytes.max(0) as u64),
            },
        }
    }
}

/// Execute folder commands
pub async fn execute(args: &FolderArgs, cli: &Cli) -> Result<(), AppError> {
    let services = super::open_services(&cli.config).await?;
    let folders = &services.folders;
    let format = cli.format;

    match &args.command {
        FolderCommand::Provision { user } => {
            let outcome = folders.provision_root(*user).await?;
            output::print_outcome_warnings(&outcome);
            output::print_success(&format!(
                "Root folder provisioned for {} (id: {})",
                user, outcome.value.id
            ));
        }
        FolderCommand::Root { user } => {
            let ctx = cli.context()?;
            let root = folders.root_of(&ctx, *user).await?;
            print_folder(&root, format);
        }
        FolderCommand::Get { id } => {
            let ctx = cli.context()?;
            let folder = folders.get_folder(&ctx, *id).await?;
            print_folder(&folder, format);
        }
        FolderCommand::List {
            id,
            page,
            page_size,
        } => {
            let ctx = cli.context()?;
            let listing = folders
                .list_children(&ctx, *id, PageRequest::new(*page, *page_size))
                .await?;
            let rows: Vec<ChildRow> = listing.items.iter().map(ChildRow::from).collect();
            output::print_list(&rows, format);
            if format == OutputFormat::Table && listing.has_next {
                println!(
                    "Page {} of {} ({} items)",
                    listing.page, listing.total_pages, listing.total_items
                );
            }
        }
        FolderCommand::Create { parent, name } => {
            let ctx = cli.context()?;
            let outcome = folders.create_folder(&ctx, *parent, name).await?;
            output::print_outcome_warnings(&outcome);
            output::print_success(&format!(
                "Folder '{}' created (id: {})",
                name, outcome.value.id
            ));
        }
        FolderCommand::Rename { id, name } => {
            let ctx = cli.context()?;
            let folder = folders.rename_folder(&ctx, *id, name).await?;
            output::print_success(&format!("Folder {} renamed to '{}'", folder.id, folder.name));
        }
        FolderCommand::Move { id, to } => {
            let ctx = cli.context()?;
            let outcome = folders.move_folder(&ctx, *id, *to).await?;
            output::print_outcome_warnings(&outcome);
            let path = folders.display_path(&ctx, NodeRef::Folder(*id)).await?;
            output::print_success(&format!("Folder moved to {}", path));
        }
        FolderCommand::Delete { ids, force } => {
            if !force {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "Delete {} folder(s) with all their contents?",
                        ids.len()
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let ctx = cli.context()?;
            let outcome = folders.delete_folders(&ctx, ids).await?;
            output::print_outcome_warnings(&outcome);
            let report = &outcome.value;
            output::print_success(&format!(
                "Deleted {} folder(s) and {} file(s), {} freed",
                report.folders,
                report.files,
                output::format_bytes(report.bytes)
            ));
        }
        FolderCommand::Tree { id } => {
            let ctx = cli.context()?;
            let tree = services.tree.get_tree(&ctx, *id).await?;
            match format {
                OutputFormat::Json => output::print_item(&tree, format),
                OutputFormat::Table => {
                    println!("{}", tree.display_path);
                    print_tree(&tree.children, "");
                }
            }
        }
        FolderCommand::Path { kind, id } => {
            let ctx = cli.context()?;
            let path = folders.display_path(&ctx, kind.node(*id)).await?;
            println!("{}", path);
        }
        FolderCommand::Address { kind, id } => {
            let ctx = cli.context()?;
            let address = folders.storage_address(&ctx, kind.node(*id)).await?;
            println!("{}", address);
        }
        FolderCommand::Size { kind, id } => {
            let ctx = cli.context()?;
            let stats = folders.calculate_subtree_size(&ctx, kind.node(*id)).await?;
            match format {
                OutputFormat::Json => output::print_item(&stats, format),
                OutputFormat::Table => {
                    output::print_kv("Total size", &output::format_bytes(stats.total_bytes));
                    output::print_kv("Files", &stats.file_count.to_string());
                    output::print_kv("Folders", &stats.folder_count.to_string());
                }
            }
        }
        FolderCommand::Recompute { id } => {
            let ctx = cli.context()?;
            let report = folders.recompute_subtree_size(&ctx, *id).await?;
            match format {
                OutputFormat::Json => output::print_item(&report, format),
                OutputFormat::Table => {
                    output::print_kv("Folders corrected", &report.corrected.to_string());
                    output::print_kv(
                        "Total size",
                        &output::format_bytes(report.computed.total_bytes),
                    );
                    if report.stored != report.computed {
                        output::print_warning("Stored counters had drifted and were corrected");
                    } else {
                        output::print_success("Counters match the live tree");
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_folder(folder: &Folder, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_item(folder, format),
        OutputFormat::Table => output::print_list(&[FolderRow::from(folder)], format),
    }
}

fn print_tree(children: &[FolderNode], prefix: &str) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        println!(
            "{}{} {}/ ({}, {} files)",
            prefix,
            if last { "└──" } else { "├──" },
            child.name,
            output::format_bytes(child.subtree_bytes),
            child.file_count
        );
        let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
        print_tree(&child.children, &next);
    }
}
