//! Partition-aware dataset manager: the caller-facing surface.
//!
//! Decorates destination table names with partition suffixes before
//! delegating to the templating tier, and enforces the existence
//! precondition on truncate/append writes.

use std::sync::Arc;
use tracing::info;

use crate::config::{validate_run_datetime, DatasetConfig};
use crate::engine::{QueryEngine, Row};
use crate::error::{BqflowError, Result};
use crate::partition;
use crate::session::SessionManager;

/// Partition-aware facade over a [`SessionManager`].
///
/// The base partition suffix is computed once at construction from the
/// session's run datetime; per-call `custom_run_datetime` overrides take
/// precedence without mutating session state.
pub struct DatasetManager {
    session: SessionManager,
    partition: String,
}

impl std::fmt::Debug for DatasetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetManager")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

impl DatasetManager {
    /// Wraps a session with the given base partition suffix.
    pub fn new(session: SessionManager, partition: impl Into<String>) -> Self {
        Self {
            session,
            partition: partition.into(),
        }
    }

    /// The session's base run datetime.
    pub fn run_datetime_str(&self) -> &str {
        self.session.run_datetime()
    }

    /// Replaces the contents of `table_name` with the result of `sql`.
    ///
    /// When `partitioned` is true (the usual case), the write targets the
    /// `table$YYYYMMDD` partition for the effective run datetime. Fails with
    /// [`BqflowError::TableNotFound`] when the base table does not exist;
    /// the engine's write path is never invoked in that case.
    pub async fn write_truncate(
        &self,
        table_name: &str,
        sql: &str,
        partitioned: bool,
        custom_run_datetime: Option<&str>,
    ) -> Result<()> {
        let destination = self
            .checked_destination(table_name, partitioned, custom_run_datetime)
            .await?;
        self.session
            .write_truncate(&destination, sql, custom_run_datetime)
            .await
    }

    /// Appends the result of `sql` to `table_name`.
    ///
    /// Same partitioning and existence rules as [`Self::write_truncate`].
    pub async fn write_append(
        &self,
        table_name: &str,
        sql: &str,
        partitioned: bool,
        custom_run_datetime: Option<&str>,
    ) -> Result<()> {
        let destination = self
            .checked_destination(table_name, partitioned, custom_run_datetime)
            .await?;
        self.session
            .write_append(&destination, sql, custom_run_datetime)
            .await
    }

    /// Creates or overwrites an ad hoc table with the result of `sql`.
    ///
    /// Tmp tables are never partitioned and need not exist beforehand. The
    /// new table becomes referenceable as `{table_name}` in later SQL within
    /// this session.
    pub async fn write_tmp(
        &mut self,
        table_name: &str,
        sql: &str,
        custom_run_datetime: Option<&str>,
    ) -> Result<()> {
        if let Some(custom) = custom_run_datetime {
            validate_run_datetime(custom)?;
        }
        self.session
            .write_tmp(table_name, sql, custom_run_datetime)
            .await
    }

    /// Renders `sql` and returns the complete result set in engine order.
    pub async fn collect(&self, sql: &str, custom_run_datetime: Option<&str>) -> Result<Vec<Row>> {
        if let Some(custom) = custom_run_datetime {
            validate_run_datetime(custom)?;
        }
        self.session.collect(sql, custom_run_datetime).await
    }

    /// Executes a DDL statement scoped to the session's dataset.
    pub async fn create_table(&self, ddl: &str) -> Result<()> {
        self.session.create_table(ddl).await
    }

    /// Returns true if `table_name` exists in the session's dataset.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        self.session.table_exists(table_name).await
    }

    /// Drops the session's dataset with its contents.
    pub async fn remove_dataset(&self) -> Result<()> {
        self.session.remove_dataset().await
    }

    /// Computes the partition-decorated destination and enforces the
    /// existence precondition on the unsuffixed base table.
    async fn checked_destination(
        &self,
        table_name: &str,
        partitioned: bool,
        custom_run_datetime: Option<&str>,
    ) -> Result<String> {
        if let Some(custom) = custom_run_datetime {
            validate_run_datetime(custom)?;
        }

        let custom_suffix = partition::suffix_for(custom_run_datetime);
        let destination = partition::decorate(
            table_name,
            partitioned,
            custom_suffix.as_deref(),
            &self.partition,
        );

        let base_name = table_name.split('$').next().unwrap_or(table_name);
        if !self.session.table_exists(base_name).await? {
            return Err(BqflowError::table_not_found(
                self.session.full_table_id(&destination),
            ));
        }

        Ok(destination)
    }
}

/// Dataset manager factory.
///
/// Validates the config, creates the dataset if it does not exist yet
/// (with a random name when none is given), and returns the full dataset id
/// together with the manager.
pub async fn create_dataset_manager(
    config: DatasetConfig,
    engine: Arc<dyn QueryEngine>,
) -> Result<(String, DatasetManager)> {
    config.validate()?;

    let dataset_name = config
        .dataset_name
        .clone()
        .unwrap_or_else(random_dataset_name);

    engine.create_dataset(&dataset_name, &config.location).await?;
    info!(
        "dataset manager ready for {}.{dataset_name}",
        config.project_id
    );

    let partition = partition::suffix_for(Some(config.run_datetime.as_str())).unwrap_or_default();
    let session = SessionManager::new(
        engine,
        config.project_id,
        dataset_name,
        config.internal_tables,
        config.external_tables,
        config.extras,
        config.run_datetime,
    );

    let dataset_id = session.dataset_id();
    Ok((dataset_id, DatasetManager::new(session, partition)))
}

/// Generates a random dataset name for throwaway sessions.
fn random_dataset_name() -> String {
    format!("{}_test_case", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    async fn manager_with(engine: Arc<MockEngine>) -> DatasetManager {
        let config = DatasetConfig::new("proj", "2020-01-01 10:00:00")
            .with_dataset_name("ds")
            .with_internal_tables(["orders"]);
        let (_, manager) = create_dataset_manager(config, engine).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_factory_creates_dataset_and_returns_id() {
        let engine = Arc::new(MockEngine::new());
        let config = DatasetConfig::new("proj", "2020-01-01").with_dataset_name("ds");

        let (dataset_id, manager) = create_dataset_manager(config, engine.clone())
            .await
            .unwrap();

        assert_eq!(dataset_id, "proj.ds");
        assert_eq!(manager.run_datetime_str(), "2020-01-01");
        assert_eq!(
            engine.created_datasets(),
            vec![("ds".to_string(), "EU".to_string())]
        );
    }

    #[tokio::test]
    async fn test_factory_generates_random_dataset_name() {
        let engine = Arc::new(MockEngine::new());
        let config = DatasetConfig::new("proj", "2020-01-01");

        let (dataset_id, _) = create_dataset_manager(config, engine.clone())
            .await
            .unwrap();

        let created = engine.created_datasets();
        assert_eq!(created.len(), 1);
        assert!(created[0].0.ends_with("_test_case"));
        assert_eq!(dataset_id, format!("proj.{}", created[0].0));
    }

    #[tokio::test]
    async fn test_factory_rejects_malformed_runtime() {
        let engine = Arc::new(MockEngine::new());
        let config = DatasetConfig::new("proj", "01/01/2020");

        let err = create_dataset_manager(config, engine.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, BqflowError::Config(_)));
        assert!(engine.created_datasets().is_empty());
    }

    #[tokio::test]
    async fn test_partitioned_write_targets_suffixed_table() {
        let engine = Arc::new(MockEngine::new().with_existing_table("proj.ds", "orders"));
        let manager = manager_with(engine.clone()).await;

        manager
            .write_truncate("orders", "SELECT 1", true, None)
            .await
            .unwrap();

        assert_eq!(engine.writes()[0].table_id, "proj.ds.orders$20200101");
    }

    #[tokio::test]
    async fn test_missing_base_table_fails_without_write() {
        let engine = Arc::new(MockEngine::new());
        let manager = manager_with(engine.clone()).await;

        let err = manager
            .write_append("orders", "SELECT 1", true, None)
            .await
            .unwrap_err();

        assert!(matches!(err, BqflowError::TableNotFound(_)));
        assert!(err.to_string().contains("proj.ds.orders$20200101"));
        assert_eq!(engine.write_count(), 0);
        assert_eq!(
            engine.existence_probes(),
            vec![("proj.ds".to_string(), "orders".to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_custom_runtime_is_config_error() {
        let engine = Arc::new(MockEngine::new().with_existing_table("proj.ds", "orders"));
        let manager = manager_with(engine.clone()).await;

        let err = manager
            .write_truncate("orders", "SELECT 1", true, Some("20200101"))
            .await
            .unwrap_err();

        assert!(matches!(err, BqflowError::Config(_)));
        assert_eq!(engine.write_count(), 0);
    }

    #[tokio::test]
    async fn test_operations_scope_to_factory_resolved_dataset() {
        let engine = Arc::new(MockEngine::new());
        let config = DatasetConfig::new("proj", "2020-01-01").with_internal_tables(["orders"]);

        // No dataset name given: the factory generates one.
        let (dataset_id, manager) = create_dataset_manager(config, engine.clone())
            .await
            .unwrap();
        engine.add_existing_table(&dataset_id, "orders");

        manager
            .write_truncate("orders", "SELECT 1", true, None)
            .await
            .unwrap();
        manager.create_table("CREATE TABLE r (x INT64)").await.unwrap();

        // Existence probe, write destination and DDL scope all carry the
        // generated dataset, not a dataset fixed anywhere else.
        assert_eq!(
            engine.existence_probes(),
            vec![(dataset_id.clone(), "orders".to_string())]
        );
        assert_eq!(
            engine.writes()[0].table_id,
            format!("{dataset_id}.orders$20200101")
        );
        assert_eq!(engine.ddl()[0].0, dataset_id);
    }

    #[tokio::test]
    async fn test_write_tmp_is_never_partitioned() {
        let engine = Arc::new(MockEngine::new());
        let mut manager = manager_with(engine.clone()).await;

        manager
            .write_tmp("staging", "SELECT 1", None)
            .await
            .unwrap();

        assert_eq!(engine.writes()[0].table_id, "proj.ds.staging");
        // Tmp writes skip the existence precondition.
        assert!(engine.existence_probes().is_empty());
    }
}
