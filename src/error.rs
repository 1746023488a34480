//! Error types for bqflow.
//!
//! Defines the main error enum used throughout the library.

use thiserror::Error;

/// Main error type for bqflow operations.
#[derive(Error, Debug)]
pub enum BqflowError {
    /// SQL references a placeholder absent from the merged template context.
    #[error("Template render error: {0}")]
    TemplateRender(String),

    /// A truncate/append write targeted a base table that does not exist.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Failure reported by the remote query engine (auth, quota, syntax,
    /// network). Propagated unchanged; no retry is attempted at this layer.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration errors (malformed run datetime, bad table id, invalid
    /// config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BqflowError {
    /// Creates a template render error with the given message.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::TemplateRender(msg.into())
    }

    /// Creates a table-not-found error with the given message.
    pub fn table_not_found(msg: impl Into<String>) -> Self {
        Self::TableNotFound(msg.into())
    }

    /// Creates an engine error with the given message.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using BqflowError.
pub type Result<T> = std::result::Result<T, BqflowError>;
