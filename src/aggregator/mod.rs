// Billing metrics aggregation: one sequential pass per scrape.
//
// Warehouse path first (discovery, month-to-date, daily, daily by service,
// instance, previous month). If it fails as a whole, the monitoring path runs
// from scratch; if that fails too, the snapshot is just the error sample and an
// error comment. Outputs of the two paths are never merged.

pub mod discovery;
mod fallback;
pub mod granularity;
pub mod observer;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::Result;
use crate::exposition::{self, EXPORTER_ERROR, EXPORTER_UP};
use crate::models::{DiscoveredTables, Entry, Labels, MetricSample};
use crate::monitoring::MonitoringSource;
use crate::warehouse::queries::{self, InstanceFilter};
use crate::warehouse::{BillingQuery, QueryKind, Row, TimeFilter, Warehouse};
use crate::windows::{TimeWindows, offset_from_minutes};

use granularity::{MonthToDate, SampleContext};
use observer::{AggregationEvent, AggregationObserver};

/// Everything the aggregator needs to know about the deployment.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub project_id: String,
    pub dataset: String,
    pub billing_account_id: String,
    pub utc_offset_minutes: i32,
    pub daily_lookback_days: u32,
    pub instance_min_cost: f64,
    pub instance_row_limit: u32,
    pub instance_service: String,
    pub vm_name_label: String,
    pub time_filter: TimeFilter,
    pub monitoring_window_days: u32,
}

impl AggregatorSettings {
    pub fn offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes)
    }

    fn instance_filter(&self) -> InstanceFilter<'_> {
        InstanceFilter {
            service: &self.instance_service,
            vm_name_label: &self.vm_name_label,
            min_cost: self.instance_min_cost,
            row_limit: self.instance_row_limit,
        }
    }

    fn sample_context(&self) -> SampleContext<'_> {
        SampleContext {
            project: &self.project_id,
            billing_account_id: &self.billing_account_id,
        }
    }
}

/// Which path produced the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Warehouse,
    Monitoring,
    /// Both paths failed; the snapshot carries only the error indicator.
    None,
}

#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub entries: Vec<Entry>,
    pub error: bool,
    pub source: DataSource,
    /// Set when the warehouse path produced the snapshot.
    pub tables: Option<DiscoveredTables>,
}

impl AggregationResult {
    pub fn render(&self) -> String {
        exposition::render(&self.entries)
    }

    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Sample(s) => Some(s),
            Entry::Comment(_) => None,
        })
    }
}

pub fn up_sample(project: &str) -> MetricSample {
    MetricSample::new(EXPORTER_UP, Labels::new().with("project", project), 1.0)
}

pub fn error_snapshot(project: &str, error: &str) -> Vec<Entry> {
    vec![
        Entry::Sample(MetricSample::new(
            EXPORTER_ERROR,
            Labels::new().with("project", project),
            1.0,
        )),
        Entry::Comment(format!("Error: {}", error)),
    ]
}

pub struct BillingAggregator {
    settings: AggregatorSettings,
    warehouse: Arc<dyn Warehouse>,
    monitoring: Arc<dyn MonitoringSource>,
    observer: Arc<dyn AggregationObserver>,
}

impl BillingAggregator {
    pub fn new(
        settings: AggregatorSettings,
        warehouse: Arc<dyn Warehouse>,
        monitoring: Arc<dyn MonitoringSource>,
        observer: Arc<dyn AggregationObserver>,
    ) -> Self {
        Self {
            settings,
            warehouse,
            monitoring,
            observer,
        }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Build a fresh snapshot as of `now`. Never fails: errors degrade the output.
    pub async fn collect(&self, now: DateTime<Utc>) -> AggregationResult {
        let windows = TimeWindows::compute(
            now,
            self.settings.offset(),
            self.settings.daily_lookback_days,
        );

        match self.collect_warehouse(&windows).await {
            Ok((entries, tables)) => {
                return AggregationResult {
                    entries,
                    error: false,
                    source: DataSource::Warehouse,
                    tables: Some(tables),
                };
            }
            Err(e) => self.observer.on_event(&AggregationEvent::WarehouseFailed {
                error: e.to_string(),
                permission_denied: e.is_permission_denied(),
            }),
        }

        match fallback::collect(
            self.monitoring.as_ref(),
            self.observer.as_ref(),
            &self.settings,
            now,
        )
        .await
        {
            Ok(entries) => AggregationResult {
                entries,
                error: false,
                source: DataSource::Monitoring,
                tables: None,
            },
            Err(e) => {
                self.observer.on_event(&AggregationEvent::MonitoringFailed {
                    error: e.to_string(),
                });
                AggregationResult {
                    entries: error_snapshot(&self.settings.project_id, &e.to_string()),
                    error: true,
                    source: DataSource::None,
                    tables: None,
                }
            }
        }
    }

    async fn collect_warehouse(
        &self,
        windows: &TimeWindows,
    ) -> Result<(Vec<Entry>, DiscoveredTables)> {
        let s = &self.settings;
        let ctx = s.sample_context();
        let tables = discovery::discover(
            self.warehouse.as_ref(),
            self.observer.as_ref(),
            &s.project_id,
            &s.dataset,
            &s.billing_account_id,
        )
        .await;

        let MonthToDate {
            mut samples,
            currency,
            ..
        } = self.month_to_date(&tables, windows, ctx).await?;
        let today = windows.today_local;

        if let Some(daily) = self
            .optional(
                QueryKind::Daily,
                queries::daily(&tables.primary, windows, s.time_filter),
                |rows| granularity::daily(rows, ctx, &currency, today),
            )
            .await
        {
            samples.extend(daily);
        }

        if let Some(by_service) = self
            .optional(
                QueryKind::DailyByService,
                queries::daily_by_service(&tables.primary, windows, s.time_filter),
                |rows| granularity::daily_by_service(rows, ctx, &currency, today),
            )
            .await
        {
            samples.extend(by_service);
        }

        match &tables.resource {
            Some(resource) => {
                if let Some(instances) = self
                    .optional(
                        QueryKind::InstanceDaily,
                        queries::instance_daily(
                            resource,
                            windows,
                            s.time_filter,
                            &s.instance_filter(),
                        ),
                        |rows| granularity::instance_daily(rows, ctx, &currency, today),
                    )
                    .await
                {
                    samples.extend(instances);
                }
            }
            None => self.observer.on_event(&AggregationEvent::GranularitySkipped {
                kind: QueryKind::InstanceDaily,
                reason: "no resource export table",
            }),
        }

        // Always present so the metric name can be discovered, zero on failure.
        let previous = self
            .optional(
                QueryKind::PreviousMonth,
                queries::previous_month(&tables.primary, windows, s.time_filter),
                |rows| vec![granularity::previous_month(rows, ctx, &currency)],
            )
            .await
            .unwrap_or_else(|| vec![granularity::previous_month_sample(ctx, &currency, 0.0)]);
        samples.extend(previous);

        samples.push(up_sample(&s.project_id));
        Ok((samples.into_iter().map(Entry::Sample).collect(), tables))
    }

    /// Month-to-date by service. On failure retries once with the alternative
    /// query; if that fails too the whole warehouse path fails.
    async fn month_to_date(
        &self,
        tables: &DiscoveredTables,
        windows: &TimeWindows,
        ctx: SampleContext<'_>,
    ) -> Result<MonthToDate> {
        let query = queries::month_to_date(&tables.primary, windows, self.settings.time_filter)?;
        let rows = match self.warehouse.query(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                self.observer.on_event(&AggregationEvent::AlternativeQuery {
                    error: e.to_string(),
                });
                let alternative = queries::month_to_date_alternative(
                    &tables.primary,
                    windows,
                    &self.settings.billing_account_id,
                )?;
                self.warehouse.query(&alternative).await?
            }
        };
        let mtd = granularity::month_to_date(&rows, ctx);
        self.observer
            .on_event(&AggregationEvent::GranularityCompleted {
                kind: QueryKind::MonthToDate,
                samples: mtd.samples.len(),
            });
        Ok(mtd)
    }

    /// Run a query whose failure only drops its own samples.
    async fn optional(
        &self,
        kind: QueryKind,
        query: Result<BillingQuery>,
        parse: impl FnOnce(&[Row]) -> Vec<MetricSample>,
    ) -> Option<Vec<MetricSample>> {
        let rows = match query {
            Ok(q) => self.warehouse.query(&q).await,
            Err(e) => Err(e),
        };
        match rows {
            Ok(rows) => {
                let samples = parse(rows.as_slice());
                self.observer
                    .on_event(&AggregationEvent::GranularityCompleted {
                        kind,
                        samples: samples.len(),
                    });
                Some(samples)
            }
            Err(e) => {
                self.observer.on_event(&AggregationEvent::GranularityFailed {
                    kind,
                    error: e.to_string(),
                });
                None
            }
        }
    }
}
