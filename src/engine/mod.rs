//! Execution-engine abstraction.
//!
//! Provides a trait-based interface over the remote query engine, allowing
//! a fake engine to be injected in tests without touching the network.

mod bigquery;
mod mock;
mod types;

pub use bigquery::{BigQueryConfig, BigQueryEngine};
pub use mock::{FailingEngine, MockEngine, WriteCall};
pub use types::{Row, TableId, Value};

use crate::error::Result;
use async_trait::async_trait;

/// Effect of a write on existing destination data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the destination contents.
    Truncate,
    /// Add to the destination contents.
    Append,
    /// Overwrite an ad hoc (tmp) table.
    Overwrite,
}

impl WriteMode {
    /// Returns the engine wire string for this mode.
    ///
    /// Overwrite shares the truncate disposition: tmp tables are replaced
    /// wholesale on every write.
    pub fn as_disposition(&self) -> &'static str {
        match self {
            Self::Truncate | Self::Overwrite => "WRITE_TRUNCATE",
            Self::Append => "WRITE_APPEND",
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Truncate => "TRUNCATE",
            Self::Append => "APPEND",
            Self::Overwrite => "OVERWRITE",
        };
        write!(f, "{name}")
    }
}

/// Trait for clients of the remote query engine.
///
/// One method per remote primitive. Every call submits at most one request
/// and resolves only once the remote job has completed; failures propagate
/// unchanged as [`crate::error::BqflowError::Engine`]. No retry or backoff
/// happens at this layer.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Submits a write job: runs `sql` with the given destination table and
    /// write disposition, and waits for completion.
    ///
    /// `table_id` must be fully qualified (`project.dataset.table`), with an
    /// optional `$YYYYMMDD` partition decoration.
    async fn submit_write(&self, table_id: &str, sql: &str, mode: WriteMode) -> Result<()>;

    /// Runs a read query and materializes the complete result set in
    /// engine-returned order.
    ///
    /// Result sets are assumed to fit in memory; no pagination is exposed.
    async fn submit_read(&self, sql: &str) -> Result<Vec<Row>>;

    /// Executes a DDL statement scoped to the given default dataset
    /// (`project.dataset`) and waits for completion.
    async fn create_table(&self, dataset_id: &str, ddl: &str) -> Result<()>;

    /// Returns true if a table with the given (short) name exists in the
    /// given dataset (`project.dataset`).
    async fn table_exists(&self, dataset_id: &str, table_name: &str) -> Result<bool>;

    /// Creates a dataset in the given location; succeeds if it already
    /// exists.
    async fn create_dataset(&self, dataset_name: &str, location: &str) -> Result<()>;

    /// Drops a dataset with its contents; succeeds if it does not exist.
    async fn delete_dataset(&self, dataset_name: &str) -> Result<()>;
}
