//! File management CLI commands.

use std::path::PathBuf;

use bytes::Bytes;
use clap::{Args, Subcommand};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::Cli;
use crate::output::{self, OutputFormat};
use canopy_core::error::AppError;
use canopy_entity::NodeRef;
use canopy_entity::file::File;
use canopy_service::CreateFileRequest;

/// Arguments for file commands
#[derive(Debug, Args)]
pub struct FileArgs {
    /// File subcommand
    #[command(subcommand)]
    pub command: FileCommand,
}

/// File subcommands
#[derive(Debug, Subcommand)]
pub enum FileCommand {
    /// Upload a local file into a folder
    Put {
        /// Destination folder ID
        #[arg(short, long)]
        folder: Uuid,
        /// Local file to upload
        source: PathBuf,
        /// Name in the tree (defaults to the local file name)
        #[arg(short, long)]
        name: Option<String>,
        /// MIME type (detected when omitted)
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Show one file
    Get {
        /// File ID
        id: Uuid,
    },
    /// Write a file's content to stdout
    Cat {
        /// File ID
        id: Uuid,
    },
    /// Rename a file
    Rename {
        /// File ID
        id: Uuid,
        /// New name
        #[arg(short, long)]
        name: String,
    },
    /// Move a file into another folder
    Move {
        /// File ID
        id: Uuid,
        /// Destination folder ID
        #[arg(short, long)]
        to: Uuid,
    },
    /// Delete a file
    Delete {
        /// File ID
        id: Uuid,
    },
}

/// Execute file commands
pub async fn execute(args: &FileArgs, cli: &Cli) -> Result<(), AppError> {
    let services = super::open_services(&cli.config).await?;
    let files = &services.files;
    let ctx = cli.context()?;

    match &args.command {
        FileCommand::Put {
            folder,
            source,
            name,
            mime_type,
        } => {
            let name = match name {
                Some(name) => name.clone(),
                None => source
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AppError::validation(format!(
                            "Cannot derive a file name from '{}'",
                            source.display()
                        ))
                    })?,
            };
            let data = Bytes::from(tokio::fs::read(source).await?);
            let outcome = files
                .create_file(
                    &ctx,
                    CreateFileRequest {
                        folder_id: *folder,
                        name: name.clone(),
                        mime_type: mime_type.clone(),
                    },
                    data,
                )
                .await?;
            output::print_outcome_warnings(&outcome);
            output::print_success(&format!(
                "File '{}' stored ({}, {}, id: {})",
                name,
                output::format_bytes(outcome.value.size_bytes.max(0) as u64),
                outcome.value.mime_type,
                outcome.value.id
            ));
        }
        FileCommand::Get { id } => {
            let file = files.get_file(&ctx, *id).await?;
            let path = services
                .folders
                .display_path(&ctx, NodeRef::File(file.id))
                .await?;
            print_file(&file, &path, cli.format);
        }
        FileCommand::Cat { id } => {
            let data = files.read_file(&ctx, *id).await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        FileCommand::Rename { id, name } => {
            let file = files.rename_file(&ctx, *id, name).await?;
            output::print_success(&format!("File {} renamed to '{}'", file.id, file.name));
        }
        FileCommand::Move { id, to } => {
            let outcome = files.move_file(&ctx, *id, *to).await?;
            output::print_outcome_warnings(&outcome);
            let path = services
                .folders
                .display_path(&ctx, NodeRef::File(*id))
                .await?;
            output::print_success(&format!("File moved to {}", path));
        }
        FileCommand::Delete { id } => {
            let outcome = files.delete_file(&ctx, *id).await?;
            output::print_outcome_warnings(&outcome);
            output::print_success(&format!("File '{}' deleted", outcome.value.name));
        }
    }

    Ok(())
}

fn print_file(file: &File, path: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_item(file, format),
        OutputFormat::Table => {
            output::print_kv("ID", &file.id.to_string());
            output::print_kv("Path", path);
            output::print_kv("Owner", &file.owner_id.to_string());
            output::print_kv("Size", &output::format_bytes(file.size_bytes.max(0) as u64));
            output::print_kv("MIME type", &file.mime_type);
            output::print_kv("Created", &file.created_at.format("%Y-%m-%d %H:%M").to_string());
        }
    }
}
