//! Configuration for dataset sessions.
//!
//! Handles loading session configuration from TOML files and validating the
//! run datetime at the boundary, before it reaches the partitioning layer.

use crate::error::{BqflowError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default dataset location.
pub const DEFAULT_LOCATION: &str = "EU";

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

/// Configuration for one dataset-manager session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Full project id where the dataset lives.
    pub project_id: String,

    /// Dataset name (not a dataset id). When absent, a random name is
    /// generated at session creation.
    pub dataset_name: Option<String>,

    /// Location used to create datasets, tables and jobs.
    #[serde(default = "default_location")]
    pub location: String,

    /// Run datetime determining the partition used for write operations.
    /// Either `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`. Also available inside
    /// SQL templates as `{dt}`.
    pub run_datetime: String,

    /// Names of tables inside the managed dataset, available during
    /// processing as template variables.
    #[serde(default)]
    pub internal_tables: Vec<String>,

    /// Tables outside the managed dataset: alias -> full table id.
    #[serde(default)]
    pub external_tables: HashMap<String, String>,

    /// Arbitrary caller-supplied values usable as template variables.
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

impl DatasetConfig {
    /// Creates a config for the given project with the given run datetime,
    /// leaving everything else at its default.
    pub fn new(project_id: impl Into<String>, run_datetime: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_name: None,
            location: default_location(),
            run_datetime: run_datetime.into(),
            internal_tables: Vec::new(),
            external_tables: HashMap::new(),
            extras: HashMap::new(),
        }
    }

    /// Loads a config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BqflowError::config(format!("Cannot read config file {}: {e}", path.display()))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            BqflowError::config(format!("Invalid config file {}: {e}", path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the config.
    ///
    /// This is the boundary where a malformed run datetime is rejected;
    /// the partitioning layer downstream only transforms, never validates.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(BqflowError::config("project_id must not be empty"));
        }
        validate_run_datetime(&self.run_datetime)?;
        Ok(())
    }

    /// Sets the dataset name.
    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }

    /// Sets the dataset location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Adds internal table names.
    pub fn with_internal_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.internal_tables
            .extend(tables.into_iter().map(Into::into));
        self
    }

    /// Adds an external table alias.
    pub fn with_external_table(
        mut self,
        alias: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        self.external_tables.insert(alias.into(), table_id.into());
        self
    }

    /// Adds an extra template variable.
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }
}

/// Validates a run datetime string against the two accepted formats:
/// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.
pub fn validate_run_datetime(run_datetime: &str) -> Result<()> {
    let is_datetime = NaiveDateTime::parse_from_str(run_datetime, "%Y-%m-%d %H:%M:%S").is_ok();
    let is_date = NaiveDate::parse_from_str(run_datetime, "%Y-%m-%d").is_ok();

    if is_datetime || is_date {
        Ok(())
    } else {
        Err(BqflowError::config(format!(
            "run_datetime '{run_datetime}' does not match 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_full_datetime() {
        assert!(validate_run_datetime("2020-01-01 10:00:00").is_ok());
    }

    #[test]
    fn test_validate_date_only() {
        assert!(validate_run_datetime("2020-01-01").is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(validate_run_datetime("2020/01/01").is_err());
        assert!(validate_run_datetime("20200101").is_err());
        assert!(validate_run_datetime("2020-13-01").is_err());
        assert!(validate_run_datetime("2020-01-01 25:00:00").is_err());
        assert!(validate_run_datetime("").is_err());
    }

    #[test]
    fn test_config_validate_rejects_empty_project() {
        let config = DatasetConfig::new("", "2020-01-01");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = DatasetConfig::new("my-project", "2020-01-01")
            .with_dataset_name("analytics")
            .with_location("US")
            .with_internal_tables(["orders", "customers"])
            .with_external_table("events", "other-project.tracking.events")
            .with_extra("env", "prod");

        assert_eq!(config.dataset_name.as_deref(), Some("analytics"));
        assert_eq!(config.location, "US");
        assert_eq!(config.internal_tables, vec!["orders", "customers"]);
        assert_eq!(
            config.external_tables.get("events").map(String::as_str),
            Some("other-project.tracking.events")
        );
        assert_eq!(config.extras.get("env").map(String::as_str), Some("prod"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(
            &path,
            r#"
project_id = "my-project"
dataset_name = "analytics"
run_datetime = "2020-01-01 10:00:00"
internal_tables = ["orders"]

[external_tables]
events = "other-project.tracking.events"

[extras]
env = "dev"
"#,
        )
        .unwrap();

        let config = DatasetConfig::from_file(&path).unwrap();
        assert_eq!(config.project_id, "my-project");
        assert_eq!(config.location, "EU");
        assert_eq!(config.run_datetime, "2020-01-01 10:00:00");
        assert_eq!(config.internal_tables, vec!["orders"]);
    }

    #[test]
    fn test_config_from_file_rejects_bad_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(
            &path,
            r#"
project_id = "my-project"
run_datetime = "01-01-2020"
"#,
        )
        .unwrap();

        let err = DatasetConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, BqflowError::Config(_)));
    }

    #[test]
    fn test_config_from_file_missing() {
        let err = DatasetConfig::from_file("/nonexistent/session.toml").unwrap_err();
        assert!(matches!(err, BqflowError::Config(_)));
    }
}
