//! Session manager: the templating tier.
//!
//! Holds per-session state (internal table aliases, external table aliases,
//! extra variables, base run datetime) and composes the template resolver
//! with the execution engine: every write/read first renders its SQL through
//! the merged context, then delegates to the engine with a fully-qualified
//! destination id.
//!
//! The internal alias map is session-scoped and only grows: `write_tmp` is
//! the sole operation that extends it, making the new table resolvable by
//! templating for the rest of the session.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::engine::{QueryEngine, Row, WriteMode};
use crate::error::Result;
use crate::template::{TemplateContext, TemplateResolver};

/// Per-session templating tier over a query engine.
pub struct SessionManager {
    engine: Arc<dyn QueryEngine>,
    project_id: String,
    dataset_name: String,
    internal_tables: HashMap<String, String>,
    external_tables: HashMap<String, String>,
    extras: HashMap<String, String>,
    run_datetime: String,
    resolver: TemplateResolver,
}

impl SessionManager {
    /// Creates a session over `engine` for the dataset
    /// `project_id.dataset_name`.
    ///
    /// `internal_tables` are short names inside the managed dataset; they are
    /// qualified eagerly so templating resolves them to full ids.
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        project_id: impl Into<String>,
        dataset_name: impl Into<String>,
        internal_tables: Vec<String>,
        external_tables: HashMap<String, String>,
        extras: HashMap<String, String>,
        run_datetime: impl Into<String>,
    ) -> Self {
        let project_id = project_id.into();
        let dataset_name = dataset_name.into();
        let dataset_id = format!("{project_id}.{dataset_name}");

        let internal_tables = internal_tables
            .into_iter()
            .map(|name| {
                let full_id = format!("{dataset_id}.{name}");
                (name, full_id)
            })
            .collect();

        Self {
            engine,
            project_id,
            dataset_name,
            internal_tables,
            external_tables,
            extras,
            run_datetime: run_datetime.into(),
            resolver: TemplateResolver::new(),
        }
    }

    /// The full dataset id (`project.dataset`).
    pub fn dataset_id(&self) -> String {
        format!("{}.{}", self.project_id, self.dataset_name)
    }

    /// The session's base run datetime.
    pub fn run_datetime(&self) -> &str {
        &self.run_datetime
    }

    /// Renders `sql` and submits a TRUNCATE write to `table_name`.
    pub async fn write_truncate(
        &self,
        table_name: &str,
        sql: &str,
        custom_run_datetime: Option<&str>,
    ) -> Result<()> {
        self.write(WriteMode::Truncate, table_name, sql, custom_run_datetime)
            .await
    }

    /// Renders `sql` and submits an APPEND write to `table_name`.
    pub async fn write_append(
        &self,
        table_name: &str,
        sql: &str,
        custom_run_datetime: Option<&str>,
    ) -> Result<()> {
        self.write(WriteMode::Append, table_name, sql, custom_run_datetime)
            .await
    }

    /// Renders `sql`, submits an OVERWRITE write to `table_name`, and
    /// registers the resolved id in the internal alias map so later SQL in
    /// this session can reference `{table_name}`.
    pub async fn write_tmp(
        &mut self,
        table_name: &str,
        sql: &str,
        custom_run_datetime: Option<&str>,
    ) -> Result<()> {
        let full_id = self.full_table_id(table_name);
        debug!("registering tmp table alias {table_name} -> {full_id}");
        self.internal_tables.insert(table_name.to_string(), full_id);

        self.write(WriteMode::Overwrite, table_name, sql, custom_run_datetime)
            .await
    }

    /// Renders `sql` and materializes the complete result set in
    /// engine-returned order.
    pub async fn collect(&self, sql: &str, custom_run_datetime: Option<&str>) -> Result<Vec<Row>> {
        let rendered = self
            .resolver
            .render(sql, &self.template_context(custom_run_datetime))?;
        self.engine.submit_read(&rendered).await
    }

    /// Executes a DDL statement scoped to the session's dataset. The DDL
    /// text is not templated.
    pub async fn create_table(&self, ddl: &str) -> Result<()> {
        self.engine.create_table(&self.dataset_id(), ddl).await
    }

    /// Returns true if `table_name` exists in the session's dataset.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        self.engine
            .table_exists(&self.dataset_id(), table_name)
            .await
    }

    /// Drops the session's dataset with its contents.
    pub async fn remove_dataset(&self) -> Result<()> {
        self.engine.delete_dataset(&self.dataset_name).await
    }

    /// Qualifies `table_name` against the session's dataset, preserving any
    /// `$partition` decoration already present on the name.
    pub fn full_table_id(&self, table_name: &str) -> String {
        match table_name.split_once('$') {
            Some((base, suffix)) => format!("{}.{base}${suffix}", self.dataset_id()),
            None => format!("{}.{table_name}", self.dataset_id()),
        }
    }

    async fn write(
        &self,
        mode: WriteMode,
        table_name: &str,
        sql: &str,
        custom_run_datetime: Option<&str>,
    ) -> Result<()> {
        let table_id = self.full_table_id(table_name);
        let rendered = self
            .resolver
            .render(sql, &self.template_context(custom_run_datetime))?;
        self.engine.submit_write(&table_id, &rendered, mode).await
    }

    /// Builds the merged template context for one call.
    ///
    /// Built fresh every time so it reflects the current internal alias map.
    /// Merge precedence: extras override internal/external entries of the
    /// same name; `dt` is applied last.
    fn template_context(&self, custom_run_datetime: Option<&str>) -> TemplateContext {
        let mut context: TemplateContext = HashMap::new();
        context.extend(
            self.internal_tables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        context.extend(
            self.external_tables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        context.extend(self.extras.iter().map(|(k, v)| (k.clone(), v.clone())));
        context.insert(
            "dt".to_string(),
            custom_run_datetime.unwrap_or(&self.run_datetime).to_string(),
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    fn session_with(engine: Arc<MockEngine>) -> SessionManager {
        SessionManager::new(
            engine,
            "proj",
            "ds",
            vec!["orders".to_string()],
            HashMap::from([(
                "events".to_string(),
                "other.tracking.events".to_string(),
            )]),
            HashMap::from([("env".to_string(), "dev".to_string())]),
            "2020-01-01 10:00:00",
        )
    }

    #[tokio::test]
    async fn test_write_qualifies_and_renders() {
        let engine = Arc::new(MockEngine::new());
        let session = session_with(engine.clone());

        session
            .write_truncate(
                "orders",
                "SELECT * FROM `{events}` WHERE dt = '{dt}'",
                None,
            )
            .await
            .unwrap();

        let writes = engine.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].table_id, "proj.ds.orders");
        assert_eq!(
            writes[0].sql,
            "SELECT * FROM `other.tracking.events` WHERE dt = '2020-01-01 10:00:00'"
        );
        assert_eq!(writes[0].mode, WriteMode::Truncate);
    }

    #[tokio::test]
    async fn test_write_preserves_partition_decoration() {
        let engine = Arc::new(MockEngine::new());
        let session = session_with(engine.clone());

        session
            .write_append("orders$20200101", "SELECT 1", None)
            .await
            .unwrap();

        assert_eq!(engine.writes()[0].table_id, "proj.ds.orders$20200101");
        assert_eq!(engine.writes()[0].mode, WriteMode::Append);
    }

    #[tokio::test]
    async fn test_custom_run_datetime_is_per_call() {
        let engine = Arc::new(MockEngine::new());
        let session = session_with(engine.clone());

        session
            .write_truncate("orders", "SELECT '{dt}'", Some("2021-06-15"))
            .await
            .unwrap();
        session
            .write_truncate("orders", "SELECT '{dt}'", None)
            .await
            .unwrap();

        let writes = engine.writes();
        assert_eq!(writes[0].sql, "SELECT '2021-06-15'");
        assert_eq!(writes[1].sql, "SELECT '2020-01-01 10:00:00'");
    }

    #[tokio::test]
    async fn test_write_tmp_registers_alias() {
        let engine = Arc::new(MockEngine::new());
        let mut session = session_with(engine.clone());

        session
            .write_tmp("staging", "SELECT * FROM `{orders}`", None)
            .await
            .unwrap();
        session
            .write_truncate("orders", "SELECT * FROM `{staging}`", None)
            .await
            .unwrap();

        let writes = engine.writes();
        assert_eq!(writes[0].table_id, "proj.ds.staging");
        assert_eq!(writes[0].mode, WriteMode::Overwrite);
        assert_eq!(writes[1].sql, "SELECT * FROM `proj.ds.staging`");
    }

    #[tokio::test]
    async fn test_extras_override_internal_aliases() {
        let engine = Arc::new(MockEngine::new());
        let session = SessionManager::new(
            engine.clone(),
            "proj",
            "ds",
            vec!["t".to_string()],
            HashMap::new(),
            HashMap::from([("t".to_string(), "B".to_string())]),
            "2020-01-01",
        );

        session.write_truncate("t", "SELECT '{t}'", None).await.unwrap();
        assert_eq!(engine.writes()[0].sql, "SELECT 'B'");
    }

    #[tokio::test]
    async fn test_dt_shadows_same_named_extra() {
        let engine = Arc::new(MockEngine::new());
        let session = SessionManager::new(
            engine.clone(),
            "proj",
            "ds",
            vec![],
            HashMap::new(),
            HashMap::from([("dt".to_string(), "never".to_string())]),
            "2020-01-01",
        );

        session.write_truncate("t", "SELECT '{dt}'", None).await.unwrap();
        assert_eq!(engine.writes()[0].sql, "SELECT '2020-01-01'");
    }

    #[tokio::test]
    async fn test_render_failure_never_reaches_engine() {
        let engine = Arc::new(MockEngine::new());
        let session = session_with(engine.clone());

        let err = session
            .write_truncate("orders", "SELECT * FROM {missing}", None)
            .await
            .unwrap_err();

        assert!(matches!(err, crate::error::BqflowError::TemplateRender(_)));
        assert_eq!(engine.write_count(), 0);
    }

    #[tokio::test]
    async fn test_collect_renders_and_delegates() {
        let engine = Arc::new(MockEngine::new());
        let session = session_with(engine.clone());

        session
            .collect("SELECT * FROM `{orders}`", None)
            .await
            .unwrap();

        assert_eq!(engine.reads(), vec!["SELECT * FROM `proj.ds.orders`"]);
    }

    #[tokio::test]
    async fn test_create_table_scopes_to_session_dataset() {
        let engine = Arc::new(MockEngine::new());
        let session = session_with(engine.clone());

        session
            .create_table("CREATE TABLE plain (x INT64)")
            .await
            .unwrap();

        assert_eq!(
            engine.ddl(),
            vec![(
                "proj.ds".to_string(),
                "CREATE TABLE plain (x INT64)".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_table_exists_scopes_to_session_dataset() {
        let engine = Arc::new(
            MockEngine::new()
                .with_existing_table("proj.ds", "orders")
                .with_existing_table("proj.other", "customers"),
        );
        let session = session_with(engine.clone());

        assert!(session.table_exists("orders").await.unwrap());
        // Present only in a foreign dataset, so not visible here.
        assert!(!session.table_exists("customers").await.unwrap());
        assert_eq!(
            engine.existence_probes(),
            vec![
                ("proj.ds".to_string(), "orders".to_string()),
                ("proj.ds".to_string(), "customers".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_dataset_uses_short_name() {
        let engine = Arc::new(MockEngine::new());
        let session = session_with(engine.clone());

        session.remove_dataset().await.unwrap();
        assert_eq!(engine.deleted_datasets(), vec!["ds"]);
    }
}
