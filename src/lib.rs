// ABOUTME: Main library for SQL Explorer
// ABOUTME: Module declarations and the public surface used by the interactive layer

// Module declarations
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod filter;
pub mod models;
pub mod paging;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{list_databases, list_tables};
pub use config::{AppConfig, ConfigError, ConnectionProfile, Preferences};
pub use error::{ExplorerError, Result};
pub use export::{export, to_csv, to_spreadsheet, ExportArtifact, ExportFormat};
pub use filter::filter_tables;
pub use models::{AuthMode, ResultPage, SessionInfo, Value};
pub use paging::{PageRequest, PagedQueryExecutor, RowOrdering, DEFAULT_PAGE_SIZE};
pub use session::{ConnectionManager, Session, Timeouts};
