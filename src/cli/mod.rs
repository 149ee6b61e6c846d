//! Command-line interface for the document ingestion pipeline.

pub mod commands;

use clap::{Parser, Subcommand};

/// Ingest class documents into PostgreSQL and Qdrant.
#[derive(Debug, Parser)]
#[command(name = "classdoc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a document: fetch, extract, chunk, embed, store
    Ingest(commands::IngestArgs),

    /// Remove a document's chunk rows and vector points
    Delete(commands::DeleteArgs),

    /// Check infrastructure status (database, Qdrant, embedding provider)
    Status(commands::StatusArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
