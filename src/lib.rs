pub mod cli;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::PipelineError;
pub use models::Config;
pub use pipeline::{IngestPipeline, IngestTask, IngestWorkerPool, TaskDispatcher};
