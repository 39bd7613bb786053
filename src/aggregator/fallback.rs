// Monitoring path: billing cost time series for the account, latest point per series.

use chrono::{DateTime, TimeDelta, Utc};

use super::granularity::DEFAULT_CURRENCY;
use super::observer::{AggregationEvent, AggregationObserver};
use super::{AggregatorSettings, up_sample};
use crate::error::Result;
use crate::exposition::{BILLING_COST, BILLING_COST_TOTAL, sanitize_label_name};
use crate::models::{Entry, Labels, MetricSample};
use crate::monitoring::{MonitoringSource, billing_cost_filter};

pub(super) async fn collect(
    source: &dyn MonitoringSource,
    observer: &dyn AggregationObserver,
    settings: &AggregatorSettings,
    now: DateTime<Utc>,
) -> Result<Vec<Entry>> {
    let project = settings.project_id.as_str();
    let billing_account_id = if settings.billing_account_id.is_empty() {
        source.billing_account_id(project).await?
    } else {
        Some(settings.billing_account_id.clone())
    };

    let mut entries = Vec::new();
    match billing_account_id {
        Some(account) => {
            let filter = billing_cost_filter(&account)?;
            let start = now
                .checked_sub_signed(TimeDelta::days(i64::from(settings.monitoring_window_days)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let series = source.list_time_series(project, &filter, start, now).await?;

            let mut total = 0.0;
            for s in &series {
                let Some(cost) = s.latest_value() else {
                    continue;
                };
                total += cost;
                let mut labels = Labels::new()
                    .with("billing_account_id", account.as_str())
                    .with("project", project);
                for (k, v) in s.resource_labels.iter().chain(s.metric_labels.iter()) {
                    labels.insert(sanitize_label_name(k), v.as_str());
                }
                entries.push(Entry::Sample(MetricSample::new(BILLING_COST, labels, cost)));
            }

            let labels = Labels::new()
                .with("project", project)
                .with("billing_account_id", account.as_str())
                .with("currency", DEFAULT_CURRENCY);
            entries.push(Entry::Sample(MetricSample::new(
                BILLING_COST_TOTAL,
                labels,
                total,
            )));
        }
        None => {
            observer.on_event(&AggregationEvent::BillingAccountMissing);
            let labels = Labels::new()
                .with("project", project)
                .with("currency", DEFAULT_CURRENCY);
            entries.push(Entry::Sample(MetricSample::new(
                BILLING_COST_TOTAL,
                labels,
                0.0,
            )));
        }
    }
    entries.push(Entry::Sample(up_sample(project)));
    Ok(entries)
}
