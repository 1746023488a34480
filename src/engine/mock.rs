//! Mock query engine for testing.
//!
//! Records every call so tests can assert on submitted writes, reads and
//! call counts without touching a real engine.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::engine::{QueryEngine, Row, WriteMode};
use crate::error::{BqflowError, Result};

/// One recorded write submission.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    /// Fully-qualified, possibly partition-decorated destination id.
    pub table_id: String,
    /// Rendered SQL as submitted.
    pub sql: String,
    /// Requested write mode.
    pub mode: WriteMode,
}

#[derive(Debug, Default)]
struct Recorded {
    writes: Vec<WriteCall>,
    reads: Vec<String>,
    ddl: Vec<(String, String)>,
    existence_probes: Vec<(String, String)>,
    created_datasets: Vec<(String, String)>,
    deleted_datasets: Vec<String>,
}

/// A mock engine that records calls and serves canned results.
///
/// Existing tables are keyed by `(dataset_id, table_name)` so tests catch
/// probes that target the wrong dataset.
#[derive(Debug, Default)]
pub struct MockEngine {
    recorded: Mutex<Recorded>,
    existing_tables: Mutex<HashSet<(String, String)>>,
    read_rows: Mutex<Vec<Row>>,
}

impl MockEngine {
    /// Creates a new mock engine with no existing tables and empty reads.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a (short) table name as existing in the given dataset
    /// (`project.dataset`).
    pub fn with_existing_table(
        self,
        dataset_id: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        self.add_existing_table(dataset_id, table_name);
        self
    }

    /// Marks a table as existing after construction, for datasets whose
    /// names are only known at runtime.
    pub fn add_existing_table(
        &self,
        dataset_id: impl Into<String>,
        table_name: impl Into<String>,
    ) {
        self.existing_tables
            .lock()
            .unwrap()
            .insert((dataset_id.into(), table_name.into()));
    }

    /// Sets the rows every read query returns.
    pub fn with_read_rows(self, rows: Vec<Row>) -> Self {
        *self.read_rows.lock().unwrap() = rows;
        self
    }

    /// Returns all recorded write submissions, in call order.
    pub fn writes(&self) -> Vec<WriteCall> {
        self.recorded.lock().unwrap().writes.clone()
    }

    /// Returns the number of write submissions.
    pub fn write_count(&self) -> usize {
        self.recorded.lock().unwrap().writes.len()
    }

    /// Returns all SQL submitted through reads, in call order.
    pub fn reads(&self) -> Vec<String> {
        self.recorded.lock().unwrap().reads.clone()
    }

    /// Returns `(dataset_id, ddl)` pairs of submitted DDL, in call order.
    pub fn ddl(&self) -> Vec<(String, String)> {
        self.recorded.lock().unwrap().ddl.clone()
    }

    /// Returns `(dataset_id, table_name)` pairs probed for existence, in
    /// call order.
    pub fn existence_probes(&self) -> Vec<(String, String)> {
        self.recorded.lock().unwrap().existence_probes.clone()
    }

    /// Returns `(dataset_name, location)` pairs of created datasets.
    pub fn created_datasets(&self) -> Vec<(String, String)> {
        self.recorded.lock().unwrap().created_datasets.clone()
    }

    /// Returns the names of deleted datasets.
    pub fn deleted_datasets(&self) -> Vec<String> {
        self.recorded.lock().unwrap().deleted_datasets.clone()
    }
}

#[async_trait]
impl QueryEngine for MockEngine {
    async fn submit_write(&self, table_id: &str, sql: &str, mode: WriteMode) -> Result<()> {
        self.recorded.lock().unwrap().writes.push(WriteCall {
            table_id: table_id.to_string(),
            sql: sql.to_string(),
            mode,
        });
        Ok(())
    }

    async fn submit_read(&self, sql: &str) -> Result<Vec<Row>> {
        self.recorded.lock().unwrap().reads.push(sql.to_string());
        Ok(self.read_rows.lock().unwrap().clone())
    }

    async fn create_table(&self, dataset_id: &str, ddl: &str) -> Result<()> {
        self.recorded
            .lock()
            .unwrap()
            .ddl
            .push((dataset_id.to_string(), ddl.to_string()));
        Ok(())
    }

    async fn table_exists(&self, dataset_id: &str, table_name: &str) -> Result<bool> {
        let key = (dataset_id.to_string(), table_name.to_string());
        self.recorded
            .lock()
            .unwrap()
            .existence_probes
            .push(key.clone());
        Ok(self.existing_tables.lock().unwrap().contains(&key))
    }

    async fn create_dataset(&self, dataset_name: &str, location: &str) -> Result<()> {
        self.recorded
            .lock()
            .unwrap()
            .created_datasets
            .push((dataset_name.to_string(), location.to_string()));
        Ok(())
    }

    async fn delete_dataset(&self, dataset_name: &str) -> Result<()> {
        self.recorded
            .lock()
            .unwrap()
            .deleted_datasets
            .push(dataset_name.to_string());
        Ok(())
    }
}

/// An engine that fails every call, for error-propagation tests.
#[derive(Debug, Clone, Default)]
pub struct FailingEngine {
    message: String,
}

impl FailingEngine {
    /// Creates a failing engine with the given error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(BqflowError::engine(self.message.clone()))
    }
}

#[async_trait]
impl QueryEngine for FailingEngine {
    async fn submit_write(&self, _table_id: &str, _sql: &str, _mode: WriteMode) -> Result<()> {
        self.fail()
    }

    async fn submit_read(&self, _sql: &str) -> Result<Vec<Row>> {
        self.fail()
    }

    async fn create_table(&self, _dataset_id: &str, _ddl: &str) -> Result<()> {
        self.fail()
    }

    async fn table_exists(&self, _dataset_id: &str, _table_name: &str) -> Result<bool> {
        self.fail()
    }

    async fn create_dataset(&self, _dataset_name: &str, _location: &str) -> Result<()> {
        self.fail()
    }

    async fn delete_dataset(&self, _dataset_name: &str) -> Result<()> {
        self.fail()
    }
}
