// BigQuery REST client: tables.list, jobs.query and jobs.getQueryResults.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BillingQuery, Row, Warehouse};
use crate::auth::{BIGQUERY_SCOPES, GcpAuth};
use crate::config::GcpCredentials;
use crate::error::{Result, SourceError};
use crate::rest::{decode_json, endpoint, http_client, next_page};

/// Server-side wait per jobs.query / getQueryResults call.
const QUERY_WAIT_MS: u64 = 10_000;
const TABLES_PAGE_SIZE: u32 = 1000;

pub struct BigQueryClient {
    http: reqwest::Client,
    auth: GcpAuth,
    base_url: String,
}

impl BigQueryClient {
    pub fn new(base_url: &str, credentials: GcpCredentials) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            auth: GcpAuth::new(credentials, BIGQUERY_SCOPES),
            base_url: base_url.to_string(),
        })
    }

    async fn query_results(
        &self,
        authorization: &str,
        project: &str,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let url = endpoint(
            &self.base_url,
            &format!("bigquery/v2/projects/{}/queries/{}", project, job.job_id),
        );
        let mut params: Vec<(&str, String)> = vec![("timeoutMs", QUERY_WAIT_MS.to_string())];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        let response = self
            .http
            .get(url)
            .header("Authorization", authorization)
            .query(&params)
            .send()
            .await?;
        decode_json(response).await
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>> {
        let authorization = self.auth.authorization().await?;
        let url = endpoint(
            &self.base_url,
            &format!("bigquery/v2/projects/{}/datasets/{}/tables", project, dataset),
        );
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params: Vec<(&str, String)> =
                vec![("maxResults", TABLES_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }
            let response = self
                .http
                .get(&url)
                .header("Authorization", &authorization)
                .query(&params)
                .send()
                .await?;
            let page: TableList = decode_json(response).await?;
            tables.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));
            page_token = next_page(page.next_page_token);
            if page_token.is_none() {
                break;
            }
        }
        Ok(tables)
    }

    async fn query(&self, query: &BillingQuery) -> Result<Vec<Row>> {
        let authorization = self.auth.authorization().await?;
        let url = endpoint(
            &self.base_url,
            &format!("bigquery/v2/projects/{}/queries", query.project_id),
        );
        let request = QueryRequest {
            query: &query.sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: query
                .params
                .iter()
                .map(|p| WireParam {
                    name: p.name,
                    parameter_type: WireParamType {
                        kind: p.kind.as_str(),
                    },
                    parameter_value: WireParamValue { value: &p.value },
                })
                .collect(),
            timeout_ms: QUERY_WAIT_MS,
        };
        let response = self
            .http
            .post(url)
            .header("Authorization", &authorization)
            .json(&request)
            .send()
            .await?;
        let mut page: QueryResponse = decode_json(response).await?;

        while !page.is_complete() {
            let Some(job) = page.job_reference.clone() else {
                return Err(SourceError::Decode(
                    "incomplete query without jobReference".into(),
                ));
            };
            debug!(kind = query.kind.as_str(), job_id = %job.job_id, "waiting for query job");
            page = self
                .query_results(&authorization, &query.project_id, &job, None)
                .await?;
        }

        let columns: Vec<String> = page
            .schema
            .as_ref()
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();
        let mut rows = decode_rows(&columns, std::mem::take(&mut page.rows));

        while let Some(token) = next_page(page.page_token.take()) {
            let Some(job) = page.job_reference.clone() else {
                break;
            };
            page = self
                .query_results(&authorization, &query.project_id, &job, Some(&token))
                .await?;
            if page.job_reference.is_none() {
                page.job_reference = Some(job);
            }
            rows.extend(decode_rows(&columns, std::mem::take(&mut page.rows)));
        }

        debug!(kind = query.kind.as_str(), rows = rows.len(), "query finished");
        Ok(rows)
    }
}

fn decode_rows(columns: &[String], rows: Vec<WireRow>) -> Vec<Row> {
    rows.into_iter()
        .map(|wire| {
            let mut row = Row::new();
            for (column, cell) in columns.iter().zip(wire.f) {
                match cell.v {
                    serde_json::Value::Null => {}
                    serde_json::Value::String(s) => row.insert(column, s),
                    other => row.insert(column, other.to_string()),
                }
            }
            row
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<WireParam<'a>>,
    timeout_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireParam<'a> {
    name: &'a str,
    parameter_type: WireParamType,
    parameter_value: WireParamValue<'a>,
}

#[derive(Serialize)]
struct WireParamType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct WireParamValue<'a> {
    value: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_complete: Option<bool>,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<WireRow>,
    page_token: Option<String>,
}

impl QueryResponse {
    fn is_complete(&self) -> bool {
        self.job_complete.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    #[serde(default)]
    f: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
struct WireCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}
