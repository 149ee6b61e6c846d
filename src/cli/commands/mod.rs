mod config;
mod delete;
mod ingest;
mod status;

pub use config::ConfigCommand;
pub use delete::DeleteArgs;
pub use ingest::IngestArgs;
pub use status::StatusArgs;

pub use config::handle_config;
pub use delete::handle_delete;
pub use ingest::handle_ingest;
pub use status::handle_status;
