// Aggregation pass tests: warehouse path, monitoring fallback, error snapshot

mod common;

use std::sync::Arc;

use billing_exporter::aggregator::DataSource;
use billing_exporter::aggregator::observer::AggregationEvent;
use billing_exporter::models::TableStrategy;
use billing_exporter::warehouse::queries::{
    COL_CURRENCY, COL_DAILY_COST, COL_SERVICE_ID, COL_SERVICE_NAME, COL_TOTAL_COST,
    COL_USAGE_DATE, COL_VM_NAME,
};
use billing_exporter::warehouse::{QueryKind, Row};
use common::*;

fn mtd_rows() -> Vec<Row> {
    vec![
        Row::new()
            .with(COL_TOTAL_COST, "100.5")
            .with(COL_SERVICE_NAME, "Compute Engine")
            .with(COL_SERVICE_ID, "6F81-5844-456A")
            .with(COL_CURRENCY, "INR"),
        Row::new()
            .with(COL_TOTAL_COST, "20")
            .with(COL_SERVICE_NAME, "BigQuery")
            .with(COL_SERVICE_ID, "24E6-581D-38E5")
            .with(COL_CURRENCY, "INR"),
    ]
}

fn full_warehouse() -> FakeWarehouse {
    FakeWarehouse::with_tables(&[STANDARD_TABLE, RESOURCE_TABLE, "cloud_pricing_export"])
        .rows(QueryKind::MonthToDate, mtd_rows())
        .rows(
            QueryKind::Daily,
            vec![
                Row::new()
                    .with(COL_USAGE_DATE, "2026-01-27")
                    .with(COL_DAILY_COST, "10")
                    .with(COL_CURRENCY, "INR"),
                Row::new()
                    .with(COL_USAGE_DATE, "2026-01-28")
                    .with(COL_DAILY_COST, "5")
                    .with(COL_CURRENCY, "INR"),
            ],
        )
        .rows(
            QueryKind::DailyByService,
            vec![
                Row::new()
                    .with(COL_USAGE_DATE, "2026-01-27")
                    .with(COL_SERVICE_NAME, "Compute Engine")
                    .with(COL_SERVICE_ID, "6F81-5844-456A")
                    .with(COL_DAILY_COST, "8")
                    .with(COL_CURRENCY, "INR"),
            ],
        )
        .rows(
            QueryKind::InstanceDaily,
            vec![
                Row::new()
                    .with(COL_USAGE_DATE, "2026-01-27")
                    .with(COL_VM_NAME, "web-1")
                    .with(COL_DAILY_COST, "3")
                    .with(COL_CURRENCY, "INR"),
            ],
        )
        .rows(
            QueryKind::PreviousMonth,
            vec![
                Row::new()
                    .with(COL_TOTAL_COST, "300")
                    .with(COL_CURRENCY, "INR"),
            ],
        )
}

struct Harness {
    warehouse: Arc<FakeWarehouse>,
    monitoring: Arc<FakeMonitoring>,
    observer: Arc<RecordingObserver>,
}

impl Harness {
    fn new(warehouse: FakeWarehouse, monitoring: FakeMonitoring) -> Self {
        Self {
            warehouse: Arc::new(warehouse),
            monitoring: Arc::new(monitoring),
            observer: Arc::new(RecordingObserver::default()),
        }
    }

    async fn collect_with(
        &self,
        settings: billing_exporter::aggregator::AggregatorSettings,
    ) -> billing_exporter::aggregator::AggregationResult {
        aggregator(
            settings,
            self.warehouse.clone(),
            self.monitoring.clone(),
            self.observer.clone(),
        )
        .collect(now())
        .await
    }

    async fn collect(&self) -> billing_exporter::aggregator::AggregationResult {
        self.collect_with(settings()).await
    }
}

#[tokio::test]
async fn test_warehouse_path_emits_every_granularity() {
    let h = Harness::new(full_warehouse(), FakeMonitoring::failing());
    let result = h.collect().await;
    assert_eq!(result.source, DataSource::Warehouse);
    assert!(!result.error);

    let text = result.render();
    assert!(text.contains(
        r#"gcp_billing_cost{project="P",service="Compute Engine",service_id="6F81-5844-456A",currency="INR"} 100.5"#
    ));
    assert!(text.contains(
        r#"gcp_billing_cost_total{project="P",billing_account_id="01AB-CD",currency="INR"} 120.5"#
    ));
    assert!(text.contains(r#"gcp_billing_cost_daily{project="P",date="2026-01-27",currency="INR"} 10"#));
    assert!(text.contains(
        r#"gcp_billing_cost_daily_by_service{project="P",date="2026-01-27",service="Compute Engine",service_id="6F81-5844-456A",currency="INR"} 8"#
    ));
    assert!(text.contains(
        r#"gcp_billing_cost_instance_daily{project="P",date="2026-01-27",vm_name="web-1",currency="INR"} 3"#
    ));
    assert!(text.contains(
        r#"gcp_billing_cost_previous_month{project="P",billing_account_id="01AB-CD",currency="INR"} 300"#
    ));
    assert!(text.ends_with("gcp_billing_exporter_up{project=\"P\"} 1\n"));
    assert!(!text.contains("gcp_billing_exporter_error"));
    assert_eq!(h.monitoring.calls(), 0);
}

#[tokio::test]
async fn test_discovery_routes_queries_to_export_tables() {
    let h = Harness::new(full_warehouse(), FakeMonitoring::failing());
    let result = h.collect().await;

    let tables = result.tables.expect("tables");
    assert_eq!(tables.primary.table_id, STANDARD_TABLE);
    assert_eq!(
        tables.resource.map(|t| t.table_id),
        Some(RESOURCE_TABLE.to_string())
    );
    assert_eq!(tables.strategy, TableStrategy::Discovered);

    for q in h.warehouse.executed() {
        let expected = if q.kind == QueryKind::InstanceDaily {
            RESOURCE_TABLE
        } else {
            STANDARD_TABLE
        };
        assert!(
            q.sql.contains(&format!("`P.billing.{}`", expected)),
            "{} ran against the wrong table",
            q.kind.as_str()
        );
    }
}

#[tokio::test]
async fn test_missing_resource_table_skips_instance_query() {
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE])
        .rows(QueryKind::MonthToDate, mtd_rows());
    let h = Harness::new(warehouse, FakeMonitoring::failing());
    let result = h.collect().await;

    assert_eq!(result.source, DataSource::Warehouse);
    assert!(!h.warehouse.executed_kinds().contains(&QueryKind::InstanceDaily));
    assert!(!result.render().contains("gcp_billing_cost_instance_daily"));
    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        AggregationEvent::GranularitySkipped {
            kind: QueryKind::InstanceDaily,
            ..
        }
    )));
}

#[tokio::test]
async fn test_failed_listing_falls_back_to_guessed_table() {
    let h = Harness::new(FakeWarehouse::failing_listing(), FakeMonitoring::failing());
    let result = h.collect().await;

    assert_eq!(result.source, DataSource::Warehouse);
    let tables = result.tables.expect("tables");
    assert_eq!(tables.primary.table_id, "gcp_billing_export_v1_01AB_CD");
    assert_eq!(tables.strategy, TableStrategy::Guessed);
    assert!(
        h.observer
            .events()
            .iter()
            .any(|e| matches!(e, AggregationEvent::DiscoveryFailed { .. }))
    );
}

#[tokio::test]
async fn test_monitoring_fallback_replaces_warehouse_output() {
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE]).fail_all_queries();
    let h = Harness::new(warehouse, FakeMonitoring::with_series(vec![series(12.5)]));
    let result = h.collect().await;

    assert_eq!(result.source, DataSource::Monitoring);
    assert!(!result.error);
    let text = result.render();
    assert!(text.contains(
        r#"gcp_billing_cost_total{project="P",billing_account_id="01AB-CD",currency="USD"} 12.5"#
    ));
    assert!(text.contains(r#"gcp_billing_cost{billing_account_id="01AB-CD",project="P"} 12.5"#));
    assert!(text.contains(r#"gcp_billing_exporter_up{project="P"} 1"#));
    assert!(!text.contains("gcp_billing_cost_daily"));
    assert!(!text.contains("gcp_billing_cost_previous_month"));
    assert!(!text.contains("gcp_billing_exporter_error"));

    assert_eq!(
        h.warehouse.executed_kinds(),
        vec![QueryKind::MonthToDate, QueryKind::MonthToDateAlternative]
    );
    let filters = h.monitoring.filters.lock().unwrap().clone();
    assert_eq!(filters.len(), 1);
    assert!(filters[0].contains("01AB-CD"));

    let events = h.observer.events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, AggregationEvent::AlternativeQuery { .. }))
    );
    assert!(events.iter().any(|e| matches!(
        e,
        AggregationEvent::WarehouseFailed {
            permission_denied: false,
            ..
        }
    )));
}

#[tokio::test]
async fn test_both_sources_failing_yields_error_snapshot() {
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE]).fail_all_queries();
    let h = Harness::new(warehouse, FakeMonitoring::failing());
    let result = h.collect().await;

    assert!(result.error);
    assert_eq!(result.source, DataSource::None);
    let text = result.render();
    let error_lines: Vec<_> = text
        .lines()
        .filter(|l| l.starts_with("gcp_billing_exporter_error"))
        .collect();
    assert_eq!(error_lines, vec![r#"gcp_billing_exporter_error{project="P"} 1"#]);
    assert!(text.lines().any(|l| l.starts_with("# Error: ")));
    assert!(!text.contains("gcp_billing_cost_total"));
    assert!(!text.contains("gcp_billing_exporter_up"));
    assert!(
        h.observer
            .events()
            .iter()
            .any(|e| matches!(e, AggregationEvent::MonitoringFailed { .. }))
    );
}

#[tokio::test]
async fn test_permission_denied_is_flagged() {
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE]).permission_denied();
    let h = Harness::new(warehouse, FakeMonitoring::with_series(vec![]));
    h.collect().await;

    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        AggregationEvent::WarehouseFailed {
            permission_denied: true,
            ..
        }
    )));
}

#[tokio::test]
async fn test_fallback_label_names_are_sanitized() {
    let mut labelled = series(2.0);
    labelled
        .resource_labels
        .insert("goog-resource.type".into(), "global".into());
    labelled
        .metric_labels
        .insert("9th.label".into(), "x".into());
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE]).fail_all_queries();
    let h = Harness::new(warehouse, FakeMonitoring::with_series(vec![labelled]));
    let text = h.collect().await.render();

    assert!(text.contains(
        r#"gcp_billing_cost{billing_account_id="01AB-CD",project="P",goog_resource_type="global",_9th_label="x"} 2"#
    ));
}

#[tokio::test]
async fn test_fallback_without_billing_account_reports_zero_total() {
    let mut s = settings();
    s.billing_account_id = String::new();
    let monitoring = FakeMonitoring {
        account: Ok(None),
        ..FakeMonitoring::with_series(vec![])
    };
    let h = Harness::new(FakeWarehouse::failing_listing().fail_all_queries(), monitoring);
    let result = h.collect_with(s).await;

    assert_eq!(result.source, DataSource::Monitoring);
    let text = result.render();
    assert!(text.contains(r#"gcp_billing_cost_total{project="P",currency="USD"} 0"#));
    assert!(text.contains(r#"gcp_billing_exporter_up{project="P"} 1"#));
    assert_eq!(h.monitoring.calls(), 0);
    assert!(h.observer.events().contains(&AggregationEvent::BillingAccountMissing));
}

#[tokio::test]
async fn test_fallback_looks_up_billing_account_when_unset() {
    let mut s = settings();
    s.billing_account_id = String::new();
    let h = Harness::new(
        FakeWarehouse::failing_listing().fail_all_queries(),
        FakeMonitoring::with_series(vec![series(4.0), series(1.5)]),
    );
    let result = h.collect_with(s).await;

    assert!(result.render().contains(
        r#"gcp_billing_cost_total{project="P",billing_account_id="01AB-CD",currency="USD"} 5.5"#
    ));
}

#[tokio::test]
async fn test_previous_month_failure_emits_zero() {
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE])
        .rows(QueryKind::MonthToDate, mtd_rows())
        .fail(QueryKind::PreviousMonth);
    let h = Harness::new(warehouse, FakeMonitoring::failing());
    let result = h.collect().await;

    assert_eq!(result.source, DataSource::Warehouse);
    assert!(result.render().contains(
        r#"gcp_billing_cost_previous_month{project="P",billing_account_id="01AB-CD",currency="INR"} 0"#
    ));
    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        AggregationEvent::GranularityFailed {
            kind: QueryKind::PreviousMonth,
            ..
        }
    )));
}

#[tokio::test]
async fn test_optional_granularity_failure_keeps_the_rest() {
    let warehouse = full_warehouse().fail(QueryKind::Daily);
    let h = Harness::new(warehouse, FakeMonitoring::failing());
    let result = h.collect().await;

    assert_eq!(result.source, DataSource::Warehouse);
    let text = result.render();
    assert!(!text.contains("gcp_billing_cost_daily{"));
    assert!(text.contains("gcp_billing_cost_daily_by_service{"));
    assert!(text.contains("gcp_billing_cost_instance_daily{"));
    assert!(text.contains(r#"gcp_billing_exporter_up{project="P"} 1"#));
}

#[tokio::test]
async fn test_alternative_month_to_date_query_rescues_warehouse_path() {
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE])
        .fail(QueryKind::MonthToDate)
        .rows(QueryKind::MonthToDateAlternative, mtd_rows());
    let h = Harness::new(warehouse, FakeMonitoring::failing());
    let result = h.collect().await;

    assert_eq!(result.source, DataSource::Warehouse);
    assert!(result.render().contains(
        r#"gcp_billing_cost_total{project="P",billing_account_id="01AB-CD",currency="INR"} 120.5"#
    ));
    let alternative = h
        .warehouse
        .executed()
        .into_iter()
        .find(|q| q.kind == QueryKind::MonthToDateAlternative)
        .expect("alternative query ran");
    assert_eq!(alternative.param("billing_account_id"), Some(ACCOUNT));
    assert_eq!(alternative.param("start_date"), Some("2026-01-01"));
}

#[tokio::test]
async fn test_daily_dates_are_strictly_before_local_today() {
    let h = Harness::new(full_warehouse(), FakeMonitoring::failing());
    let result = h.collect().await;

    let dated: Vec<_> = result
        .samples()
        .filter_map(|s| s.labels.get("date"))
        .collect();
    assert!(!dated.is_empty());
    assert!(dated.iter().all(|d| *d < "2026-01-28"));
}

#[tokio::test]
async fn test_collect_is_repeatable() {
    let h = Harness::new(full_warehouse(), FakeMonitoring::failing());
    let first = h.collect().await.render();
    let second = h.collect().await.render();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_label_values_are_escaped() {
    let warehouse = FakeWarehouse::with_tables(&[STANDARD_TABLE]).rows(
        QueryKind::MonthToDate,
        vec![
            Row::new()
                .with(COL_TOTAL_COST, "1")
                .with(COL_SERVICE_NAME, "Say \"hi\"\nback\\slash")
                .with(COL_SERVICE_ID, "X"),
        ],
    );
    let h = Harness::new(warehouse, FakeMonitoring::failing());
    let text = h.collect().await.render();
    assert!(text.contains(r#"service="Say \"hi\"\nback\\slash""#));
}
