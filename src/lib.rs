//! bqflow - a partition-aware dataset manager for BigQuery-style engines.
//!
//! Workflow code hands the library raw SQL with `{name}` placeholders and a
//! logical destination table; the library resolves template variables,
//! derives the `table$YYYYMMDD` partition decoration from the session's run
//! datetime, and submits the job to the remote engine, waiting for
//! completion.
//!
//! Layering, outermost first: [`dataset::DatasetManager`] (partitioning) over
//! [`session::SessionManager`] (templating) over [`engine::QueryEngine`]
//! (execution). Each layer holds the next by construction-time injection, so
//! tests can substitute a fake engine.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod logging;
pub mod partition;
pub mod session;
pub mod template;

pub use config::DatasetConfig;
pub use dataset::{create_dataset_manager, DatasetManager};
pub use engine::{BigQueryConfig, BigQueryEngine, QueryEngine, Row, Value, WriteMode};
pub use error::{BqflowError, Result};
