//! BigQuery execution engine.
//!
//! Implements the `QueryEngine` trait over the BigQuery v2 REST API using
//! reqwest. Write and DDL jobs are inserted and then polled until the remote
//! job reports completion; reads use the synchronous query endpoint and
//! materialize every result page.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::engine::{QueryEngine, Row, TableId, Value, WriteMode};
use crate::error::{BqflowError, Result};

/// Default timeout for a single API request.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// BigQuery v2 REST API base URL.
const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Delay between job-status polls.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// How long the synchronous query endpoint may hold a request open.
const QUERY_WAIT_TIMEOUT_MS: u64 = 10_000;

/// BigQuery engine configuration.
///
/// The engine is project-scoped; dataset identity is carried per call by
/// the session that owns it.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    /// Project that owns jobs and datasets.
    pub project_id: String,
    /// OAuth2 access token used as a bearer credential.
    pub access_token: String,
    /// API base URL (override for emulators/tests).
    pub api_base: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Delay between job-status polls in milliseconds.
    pub poll_interval_ms: u64,
}

impl BigQueryConfig {
    /// Creates a config with the given project and token.
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: access_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Creates a config reading the access token from the
    /// `BIGQUERY_ACCESS_TOKEN` environment variable.
    pub fn from_env(project_id: impl Into<String>) -> Result<Self> {
        let token = std::env::var("BIGQUERY_ACCESS_TOKEN").map_err(|_| {
            BqflowError::config("BIGQUERY_ACCESS_TOKEN environment variable not set")
        })?;
        Ok(Self::new(project_id, token))
    }

    /// Sets the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the job-poll interval.
    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}

/// BigQuery REST client.
#[derive(Debug, Clone)]
pub struct BigQueryEngine {
    config: BigQueryConfig,
    client: Client,
}

impl BigQueryEngine {
    /// Creates a new engine with the given configuration.
    pub fn new(config: BigQueryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BqflowError::engine(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.access_token)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        Self::read_json(response).await
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.config.access_token)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BqflowError::engine(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(parse_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| BqflowError::engine(format!("Failed to parse response: {e}")))
    }

    /// Inserts a query job and waits until the remote job completes.
    async fn run_job(&self, query: QueryJobConfig) -> Result<()> {
        let request = InsertJobRequest {
            configuration: JobConfiguration { query },
        };

        let path = format!("/projects/{}/jobs", self.config.project_id);
        let inserted = self.post_json(&path, &request).await?;

        let job: Job = serde_json::from_value(inserted)
            .map_err(|e| BqflowError::engine(format!("Malformed job response: {e}")))?;
        self.wait_for_job(&job.job_reference).await
    }

    /// Polls `jobs.get` until the job reports DONE, surfacing its
    /// error result if the job failed.
    async fn wait_for_job(&self, job_ref: &JobReference) -> Result<()> {
        let path = format!(
            "/projects/{}/jobs/{}",
            self.config.project_id, job_ref.job_id
        );

        loop {
            let body = match &job_ref.location {
                Some(location) => self.get_json(&path, &[("location", location)]).await?,
                None => self.get_json(&path, &[]).await?,
            };

            let job: Job = serde_json::from_value(body)
                .map_err(|e| BqflowError::engine(format!("Malformed job response: {e}")))?;

            if job.status.state == "DONE" {
                if let Some(err) = job.status.error_result {
                    return Err(BqflowError::engine(format!(
                        "Job {} failed: {}",
                        job_ref.job_id, err.message
                    )));
                }
                return Ok(());
            }

            debug!(job_id = %job_ref.job_id, state = %job.status.state, "waiting for job");
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    /// Fetches remaining result pages via `getQueryResults` until the job
    /// completes and no page token remains.
    async fn collect_rows(&self, mut response: QueryResponse) -> Result<Vec<Row>> {
        let mut schema = response.schema.take();
        let mut rows = Vec::new();
        append_rows(&mut rows, response.rows.take(), &schema)?;

        let job_ref = response.job_reference.clone();
        let mut complete = response.job_complete.unwrap_or(false);
        let mut page_token = response.page_token.take();

        while !complete || page_token.is_some() {
            let job_ref = job_ref.as_ref().ok_or_else(|| {
                BqflowError::engine("Query response carries no job reference to page through")
            })?;

            let path = format!(
                "/projects/{}/queries/{}",
                self.config.project_id, job_ref.job_id
            );
            let timeout_ms = QUERY_WAIT_TIMEOUT_MS.to_string();
            let mut query: Vec<(&str, &str)> = vec![("timeoutMs", &timeout_ms)];
            if let Some(location) = &job_ref.location {
                query.push(("location", location));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token));
            }

            let body = self.get_json(&path, &query).await?;
            let mut page: QueryResponse = serde_json::from_value(body)
                .map_err(|e| BqflowError::engine(format!("Malformed query response: {e}")))?;

            if schema.is_none() {
                schema = page.schema.take();
            }
            complete = page.job_complete.unwrap_or(false);
            if complete {
                append_rows(&mut rows, page.rows.take(), &schema)?;
                page_token = page.page_token.take();
            }
        }

        Ok(rows)
    }
}

#[async_trait]
impl QueryEngine for BigQueryEngine {
    async fn submit_write(&self, table_id: &str, sql: &str, mode: WriteMode) -> Result<()> {
        // Reject malformed destination ids before shaping the request.
        let destination = TableId::parse(table_id)?;
        info!("{mode} to {table_id}");

        self.run_job(QueryJobConfig {
            query: sql.to_string(),
            use_legacy_sql: false,
            allow_large_results: Some(true),
            destination_table: Some(TableReference {
                project_id: destination.project.clone(),
                dataset_id: destination.dataset.clone(),
                table_id: destination.decorated_table(),
            }),
            write_disposition: Some(mode.as_disposition().to_string()),
            default_dataset: None,
        })
        .await
    }

    async fn submit_read(&self, sql: &str) -> Result<Vec<Row>> {
        info!("COLLECTING DATA: {sql}");

        let request = SyncQueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
            timeout_ms: QUERY_WAIT_TIMEOUT_MS,
        };

        let path = format!("/projects/{}/queries", self.config.project_id);
        let body = self.post_json(&path, &request).await?;
        let response: QueryResponse = serde_json::from_value(body)
            .map_err(|e| BqflowError::engine(format!("Malformed query response: {e}")))?;

        self.collect_rows(response).await
    }

    async fn create_table(&self, dataset_id: &str, ddl: &str) -> Result<()> {
        let (project, dataset) = split_dataset_id(dataset_id)?;
        info!("CREATE TABLE in {dataset_id}: {ddl}");

        self.run_job(QueryJobConfig {
            query: ddl.to_string(),
            use_legacy_sql: false,
            allow_large_results: None,
            destination_table: None,
            write_disposition: None,
            default_dataset: Some(DatasetReference {
                project_id: project.to_string(),
                dataset_id: dataset.to_string(),
            }),
        })
        .await
    }

    async fn table_exists(&self, dataset_id: &str, table_name: &str) -> Result<bool> {
        // Validate the scope before interpolating it into metadata SQL.
        split_dataset_id(dataset_id)?;
        let sql = format!(
            "SELECT count(*) FROM `{dataset_id}.__TABLES__` WHERE table_id = '{table_name}'"
        );

        let rows = self.submit_read(&sql).await?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_int)
            .ok_or_else(|| BqflowError::engine("Metadata count query returned no rows"))?;

        Ok(count > 0)
    }

    async fn create_dataset(&self, dataset_name: &str, location: &str) -> Result<()> {
        let request = InsertDatasetRequest {
            dataset_reference: DatasetReference {
                project_id: self.config.project_id.clone(),
                dataset_id: dataset_name.to_string(),
            },
            location: location.to_string(),
        };

        let path = format!("/projects/{}/datasets", self.config.project_id);
        let response = self
            .client
            .post(self.url(&path))
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        // Already existing is fine (exists_ok).
        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!("dataset {dataset_name} already exists");
            return Ok(());
        }

        Self::read_json(response).await.map(|_| ())
    }

    async fn delete_dataset(&self, dataset_name: &str) -> Result<()> {
        let path = format!(
            "/projects/{}/datasets/{dataset_name}",
            self.config.project_id
        );
        let response = self
            .client
            .delete(self.url(&path))
            .bearer_auth(&self.config.access_token)
            .query(&[("deleteContents", "true")])
            .send()
            .await
            .map_err(map_transport_error)?;

        // Already gone is fine (not_found_ok).
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body));
        }

        Ok(())
    }
}

/// Splits a `project.dataset` id into its two segments, rejecting anything
/// of a different shape.
fn split_dataset_id(dataset_id: &str) -> Result<(&str, &str)> {
    match dataset_id.split_once('.') {
        Some((project, dataset))
            if !project.is_empty() && !dataset.is_empty() && !dataset.contains('.') =>
        {
            Ok((project, dataset))
        }
        _ => Err(BqflowError::config(format!(
            "dataset id '{dataset_id}' is not of the form 'project.dataset'"
        ))),
    }
}

/// Maps reqwest transport failures to engine errors.
fn map_transport_error(e: reqwest::Error) -> BqflowError {
    if e.is_timeout() {
        BqflowError::engine("Request timed out")
    } else if e.is_connect() {
        BqflowError::engine("Failed to connect to the query engine. Check your network.")
    } else {
        BqflowError::engine(format!("Request failed: {e}"))
    }
}

/// Parses an API error response.
fn parse_error(status: reqwest::StatusCode, body: &str) -> BqflowError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return BqflowError::engine("Authentication failed. Check your BIGQUERY_ACCESS_TOKEN.");
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return BqflowError::engine("Rate limited by the query engine. Please wait and retry.");
    }

    if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(body) {
        return BqflowError::engine(format!("API error: {}", error_response.error.message));
    }

    BqflowError::engine(format!("API error ({status}): {body}"))
}

/// Converts one page of wire rows into `Value` rows using the schema.
fn append_rows(
    out: &mut Vec<Row>,
    rows: Option<Vec<WireRow>>,
    schema: &Option<TableSchema>,
) -> Result<()> {
    let Some(rows) = rows else {
        return Ok(());
    };

    let fields = schema
        .as_ref()
        .map(|s| s.fields.as_slice())
        .ok_or_else(|| BqflowError::engine("Query response carries rows but no schema"))?;

    for row in rows {
        let mut values = Vec::with_capacity(row.f.len());
        for (cell, field) in row.f.iter().zip(fields) {
            values.push(convert_cell(&cell.v, &field.field_type)?);
        }
        out.push(values);
    }

    Ok(())
}

/// Converts one wire cell to a `Value`.
///
/// BigQuery serializes every scalar as a JSON string; the schema field type
/// decides how it is decoded.
fn convert_cell(v: &serde_json::Value, field_type: &str) -> Result<Value> {
    let serde_json::Value::String(text) = v else {
        // NULL cells arrive as JSON null; anything else (nested records)
        // falls back to its JSON rendering.
        return Ok(match v {
            serde_json::Value::Null => Value::Null,
            other => Value::String(other.to_string()),
        });
    };

    let value = match field_type.to_uppercase().as_str() {
        "INTEGER" | "INT64" => Value::Int(text.parse().map_err(|_| {
            BqflowError::engine(format!("Cannot parse '{text}' as INT64"))
        })?),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            Value::Float(text.parse().map_err(|_| {
                BqflowError::engine(format!("Cannot parse '{text}' as FLOAT64"))
            })?)
        }
        "BOOLEAN" | "BOOL" => Value::Bool(text == "true"),
        "BYTES" => Value::Bytes(
            base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| BqflowError::engine(format!("Cannot decode BYTES cell: {e}")))?,
        ),
        _ => Value::String(text.clone()),
    };

    Ok(value)
}

// BigQuery v2 API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertJobRequest {
    configuration: JobConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobConfiguration {
    query: QueryJobConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryJobConfig {
    query: String,
    use_legacy_sql: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_large_results: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_table: Option<TableReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_dataset: Option<DatasetReference>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    project_id: String,
    dataset_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertDatasetRequest {
    dataset_reference: DatasetReference,
    location: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncQueryRequest {
    query: String,
    use_legacy_sql: bool,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: JobStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Option<Vec<WireRow>>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct SchemaField {
    #[allow(dead_code)]
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    f: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
struct WireCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
