use std::io::Write;

use anyhow::Result;
use clap::Args;
use uuid::Uuid;

use crate::models::Config;
use crate::services::{QdrantVectorStore, VectorIndex};
use crate::store::{DocumentStore, PgDocumentStore};

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Document whose chunks and vectors should be removed
    pub document_id: Uuid,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub async fn handle_delete(args: DeleteArgs, _verbose: bool) -> Result<()> {
    if !args.yes && !confirm(&format!(
        "Delete all chunks and vectors for document {}? [y/N] ",
        args.document_id
    ))? {
        println!("Aborted.");
        return Ok(());
    }

    let config = Config::load()?;
    let store = PgDocumentStore::connect(&config.database).await?;
    let index = QdrantVectorStore::new(&config.vector_store, config.embedding.dimension)?;

    // Vectors first; a stray chunk row is less harmful than a stray
    // point claiming a document that no longer has rows
    index.delete_by_document(args.document_id).await?;
    let rows = store.delete_chunks(args.document_id).await?;

    println!(
        "Deleted {} chunk rows and their vector points for document {}",
        rows, args.document_id
    );

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
