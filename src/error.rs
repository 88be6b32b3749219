// ABOUTME: Error kinds returned by every explorer operation
// ABOUTME: One variant per failure class so callers can tell them apart

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExplorerError {
    /// Bad input detected before any I/O
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Catalog listing failed: {0}")]
    Catalog(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("Export failed: {0}")]
    Export(String),
}

impl ExplorerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExplorerError::Timeout { .. })
    }
}

pub type Result<T, E = ExplorerError> = std::result::Result<T, E>;
