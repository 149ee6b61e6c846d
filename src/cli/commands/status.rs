use anyhow::Result;
use clap::Args;
use console::style;
use uuid::Uuid;

use crate::models::Config;
use crate::services::{QdrantVectorStore, VectorIndex, create_provider};
use crate::store::{DocumentStore, PgDocumentStore};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Show processing state for one document
    pub document_id: Option<Uuid>,
}

pub async fn handle_status(args: StatusArgs, _verbose: bool) -> Result<()> {
    let config = Config::load()?;

    let database_ok = match PgDocumentStore::connect(&config.database).await {
        Ok(store) => store.health_check().await.unwrap_or(false),
        Err(_) => false,
    };

    let (qdrant_ok, points) =
        match QdrantVectorStore::new(&config.vector_store, config.embedding.dimension) {
            Ok(index) => {
                let ok = index.health_check().await.unwrap_or(false);
                let points = if ok {
                    index.points_count().await.ok().flatten()
                } else {
                    None
                };
                (ok, points)
            }
            Err(_) => (false, None),
        };

    let (provider_name, provider_ok) = match create_provider(&config.embedding) {
        Ok(provider) => (provider.name(), provider.health_check().await.is_ok()),
        Err(_) => ("unavailable", false),
    };

    println!("PostgreSQL:         {}", mark(database_ok));
    println!(
        "Qdrant:             {}  (collection '{}', {} points)",
        mark(qdrant_ok),
        config.vector_store.collection,
        points.map_or_else(|| "no".to_string(), |n| n.to_string())
    );
    println!(
        "Embedding provider: {}  ({})",
        mark(provider_ok),
        provider_name
    );

    if let Some(document_id) = args.document_id {
        println!();
        if database_ok {
            let store = PgDocumentStore::connect(&config.database).await?;
            let status = store.document_status(document_id).await?;
            let chunks = store.chunk_count(document_id).await?;
            println!("Document {}: {} ({} chunks)", document_id, status, chunks);
        } else {
            println!("Document {}: unknown (database unreachable)", document_id);
        }
    }

    if !database_ok {
        eprintln!();
        eprintln!("Warning: PostgreSQL not accessible. Check DATABASE_URL.");
    }
    if !qdrant_ok {
        eprintln!();
        eprintln!("Warning: Qdrant not running. Start with: docker-compose up -d qdrant");
    }

    Ok(())
}

fn mark(ok: bool) -> String {
    if ok {
        style("ok").green().to_string()
    } else {
        style("down").red().to_string()
    }
}
