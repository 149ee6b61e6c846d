use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use crate::models::{Config, DocumentStatus};
use crate::pipeline::{IngestPipeline, IngestTask, IngestWorkerPool};
use crate::services::{HttpSourceFetcher, QdrantVectorStore, create_provider};
use crate::store::{DocumentStore, PgDocumentStore};

const FETCH_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Document id; its row must already exist in the documents table
    pub document_id: Uuid,

    /// URL to fetch the source PDF from
    pub source_url: String,

    /// Extra payload entries carried onto every chunk, as key=value
    #[arg(long = "meta", value_parser = parse_key_val)]
    pub meta: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got: {s}"))
}

pub async fn handle_ingest(args: IngestArgs, verbose: bool) -> Result<()> {
    let config = Config::load()?;

    let store = Arc::new(PgDocumentStore::connect(&config.database).await?);
    let provider = create_provider(&config.embedding)?;
    let index = Arc::new(QdrantVectorStore::new(
        &config.vector_store,
        provider.dimension(),
    )?);
    let fetcher = Arc::new(HttpSourceFetcher::new(FETCH_TIMEOUT_SECS)?);

    if verbose {
        eprintln!(
            "Using {} embedding provider ({}d), collection '{}'",
            provider.name(),
            provider.dimension(),
            config.vector_store.collection
        );
    }

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        index,
        provider,
        fetcher,
        &config.pipeline,
    ));
    let pool = IngestWorkerPool::start(Arc::clone(&pipeline), &config.pipeline);
    let dispatcher = pool.dispatcher();

    let mut task = IngestTask::new(args.document_id, &args.source_url);
    for (key, value) in args.meta {
        task.metadata.insert(key, value);
    }
    dispatcher.dispatch(task).await?;
    drop(dispatcher);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap(),
    );

    // The worker evicts the progress entry when the delivery ends, so
    // the last message seen while polling is kept for the final report
    let last_message = Arc::new(std::sync::Mutex::new(String::new()));
    let render = {
        let pipeline = Arc::clone(&pipeline);
        let pb = pb.clone();
        let last_message = Arc::clone(&last_message);
        let document_id = args.document_id;
        tokio::spawn(async move {
            loop {
                if let Some(progress) = pipeline.progress().snapshot(document_id) {
                    pb.set_position(u64::from(progress.current));
                    if let Ok(mut message) = last_message.lock() {
                        message.clone_from(&progress.status_message);
                    }
                    pb.set_message(progress.status_message);
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
    };

    // The queue is closed, so this returns once the run is finished
    pool.shutdown().await;
    render.abort();

    let status = store.document_status(args.document_id).await?;
    match status {
        DocumentStatus::Processed => {
            pb.finish_with_message("Done");
            let chunks = store.chunk_count(args.document_id).await?;
            println!(
                "Ingested document {} ({} chunks)",
                args.document_id, chunks
            );
            Ok(())
        }
        other => {
            let cause = last_message
                .lock()
                .map(|m| m.clone())
                .unwrap_or_default();
            pb.abandon_with_message(cause.clone());
            anyhow::bail!(
                "ingestion did not complete: document {} is {} ({})",
                args.document_id,
                other,
                cause
            );
        }
    }
}
