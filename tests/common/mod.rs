// Shared test helpers: scripted billing sources and an event recorder

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use billing_exporter::aggregator::observer::{AggregationEvent, AggregationObserver};
use billing_exporter::aggregator::{AggregatorSettings, BillingAggregator};
use billing_exporter::error::{Result, SourceError};
use billing_exporter::monitoring::{MonitoringSource, Point, TimeSeries};
use billing_exporter::warehouse::{BillingQuery, QueryKind, Row, TimeFilter, Warehouse};
use chrono::{DateTime, TimeZone, Utc};

pub const PROJECT: &str = "P";
pub const DATASET: &str = "billing";
pub const ACCOUNT: &str = "01AB-CD";
pub const STANDARD_TABLE: &str = "gcp_billing_export_v1_01AB_CD";
pub const RESOURCE_TABLE: &str = "gcp_billing_export_resource_v1_01AB_CD";

/// 2026-01-28 11:30 in +05:30.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 28, 6, 0, 0).unwrap()
}

pub fn settings() -> AggregatorSettings {
    AggregatorSettings {
        project_id: PROJECT.into(),
        dataset: DATASET.into(),
        billing_account_id: ACCOUNT.into(),
        utc_offset_minutes: 330,
        daily_lookback_days: 7,
        instance_min_cost: 0.01,
        instance_row_limit: 100,
        instance_service: "Compute Engine".into(),
        vm_name_label: "goog-compute-vm-name".into(),
        time_filter: TimeFilter::Either,
        monitoring_window_days: 30,
    }
}

fn scripted_failure(what: &str) -> SourceError {
    SourceError::Api {
        status: 400,
        message: format!("scripted failure: {}", what),
    }
}

/// Warehouse with a fixed table listing and per-query-kind results.
/// Kinds without a script return no rows.
#[derive(Default)]
pub struct FakeWarehouse {
    tables: Option<Vec<String>>,
    responses: HashMap<QueryKind, Option<Vec<Row>>>,
    fail_all_queries: bool,
    denied: bool,
    executed: Mutex<Vec<BillingQuery>>,
}

impl FakeWarehouse {
    pub fn with_tables(names: &[&str]) -> Self {
        Self {
            tables: Some(names.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn failing_listing() -> Self {
        Self::default()
    }

    pub fn rows(mut self, kind: QueryKind, rows: Vec<Row>) -> Self {
        self.responses.insert(kind, Some(rows));
        self
    }

    pub fn fail(mut self, kind: QueryKind) -> Self {
        self.responses.insert(kind, None);
        self
    }

    pub fn fail_all_queries(mut self) -> Self {
        self.fail_all_queries = true;
        self
    }

    /// Query failures read as access errors.
    pub fn permission_denied(mut self) -> Self {
        self.fail_all_queries = true;
        self.denied = true;
        self
    }

    pub fn executed(&self) -> Vec<BillingQuery> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_kinds(&self) -> Vec<QueryKind> {
        self.executed().into_iter().map(|q| q.kind).collect()
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn list_tables(&self, _project: &str, _dataset: &str) -> Result<Vec<String>> {
        self.tables
            .clone()
            .ok_or_else(|| scripted_failure("tables.list"))
    }

    async fn query(&self, query: &BillingQuery) -> Result<Vec<Row>> {
        self.executed.lock().unwrap().push(query.clone());
        if self.denied {
            return Err(SourceError::Api {
                status: 403,
                message: "Access Denied: Table P:billing: Permission bigquery.tables.getData denied"
                    .into(),
            });
        }
        if self.fail_all_queries {
            return Err(scripted_failure(query.kind.as_str()));
        }
        match self.responses.get(&query.kind) {
            Some(Some(rows)) => Ok(rows.clone()),
            Some(None) => Err(scripted_failure(query.kind.as_str())),
            None => Ok(Vec::new()),
        }
    }
}

/// Monitoring source with a scripted account lookup and series listing.
pub struct FakeMonitoring {
    /// `Err(())` makes the lookup fail.
    pub account: std::result::Result<Option<String>, ()>,
    /// `None` makes the listing fail.
    pub series: Option<Vec<TimeSeries>>,
    pub filters: Mutex<Vec<String>>,
}

impl FakeMonitoring {
    pub fn with_series(series: Vec<TimeSeries>) -> Self {
        Self {
            account: Ok(Some(ACCOUNT.into())),
            series: Some(series),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            account: Err(()),
            series: None,
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.filters.lock().unwrap().len()
    }
}

#[async_trait]
impl MonitoringSource for FakeMonitoring {
    async fn billing_account_id(&self, _project: &str) -> Result<Option<String>> {
        self.account
            .clone()
            .map_err(|_| scripted_failure("billingInfo"))
    }

    async fn list_time_series(
        &self,
        _project: &str,
        filter: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeries>> {
        self.filters.lock().unwrap().push(filter.to_string());
        self.series
            .clone()
            .ok_or_else(|| scripted_failure("timeSeries.list"))
    }
}

/// One series with a single point.
pub fn series(value: f64) -> TimeSeries {
    TimeSeries {
        resource_labels: [("billing_account_id".to_string(), ACCOUNT.to_string())]
            .into_iter()
            .collect(),
        metric_labels: Default::default(),
        points: vec![Point {
            end_time: Some(Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).unwrap()),
            value: Some(value),
        }],
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AggregationEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<AggregationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AggregationObserver for RecordingObserver {
    fn on_event(&self, event: &AggregationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn aggregator(
    settings: AggregatorSettings,
    warehouse: Arc<FakeWarehouse>,
    monitoring: Arc<FakeMonitoring>,
    observer: Arc<RecordingObserver>,
) -> BillingAggregator {
    BillingAggregator::new(settings, warehouse, monitoring, observer)
}
