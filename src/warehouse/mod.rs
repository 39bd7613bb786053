// Billing warehouse access: the collaborator trait, bound-parameter queries and rows.

mod bigquery;
pub mod queries;

pub use bigquery::BigQueryClient;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// Tabular billing data source.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Table ids in `project.dataset`.
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>>;

    /// Run a query to completion and return every row.
    async fn query(&self, query: &BillingQuery) -> Result<Vec<Row>>;
}

/// Which aggregate a query computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    MonthToDate,
    /// Month-to-date on `usage_start_time` and billing account only, for tables
    /// without a partition column.
    MonthToDateAlternative,
    Daily,
    DailyByService,
    InstanceDaily,
    PreviousMonth,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::MonthToDate => "month_to_date",
            QueryKind::MonthToDateAlternative => "month_to_date_alternative",
            QueryKind::Daily => "daily",
            QueryKind::DailyByService => "daily_by_service",
            QueryKind::InstanceDaily => "instance_daily",
            QueryKind::PreviousMonth => "previous_month",
        }
    }
}

/// Which time column(s) restrict the scanned rows.
///
/// `Either` ORs the partition and usage-start predicates. A row matching both
/// still appears once in the scan, so the OR widens the row set but cannot make
/// GROUP BY count a row twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFilter {
    #[default]
    Either,
    PartitionTime,
    UsageStartTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Date,
    Float64,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "STRING",
            ParamType::Date => "DATE",
            ParamType::Float64 => "FLOAT64",
        }
    }
}

/// Named query parameter (`@name` in the SQL text).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: &'static str,
    pub kind: ParamType,
    pub value: String,
}

impl QueryParam {
    pub fn string(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            kind: ParamType::String,
            value: value.into(),
        }
    }

    pub fn date(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            kind: ParamType::Date,
            value: value.into(),
        }
    }

    pub fn float(name: &'static str, value: f64) -> Self {
        Self {
            name,
            kind: ParamType::Float64,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingQuery {
    pub kind: QueryKind,
    /// Project the query job runs in.
    pub project_id: String,
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl BillingQuery {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// One result row: column name to cell text. NULL cells are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(HashMap<String, String>);

impl Row {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.0.insert(column.to_string(), value.into());
    }

    /// Cell text; empty strings read as NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(|v| v.parse().ok())
    }
}
