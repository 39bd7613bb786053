// Secondary billing source: Cloud Monitoring time series plus the Cloud Billing
// project lookup. Only consulted when the warehouse path fails.

mod client;

pub use client::MonitoringClient;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, SourceError};

pub const BILLING_COST_METRIC_TYPE: &str = "billing/billing_account_id/cost";

#[async_trait]
pub trait MonitoringSource: Send + Sync {
    /// Billing account linked to the project, if any (id only, no `billingAccounts/` prefix).
    async fn billing_account_id(&self, project: &str) -> Result<Option<String>>;

    async fn list_time_series(
        &self,
        project: &str,
        filter: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeries>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub resource_labels: BTreeMap<String, String>,
    pub metric_labels: BTreeMap<String, String>,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub end_time: Option<DateTime<Utc>>,
    /// `None` for non-numeric point values.
    pub value: Option<f64>,
}

impl TimeSeries {
    /// Most recent numeric point by end time. Points without a timestamp lose to
    /// timestamped ones; among equals the first listed wins.
    pub fn latest_value(&self) -> Option<f64> {
        let mut best: Option<&Point> = None;
        for point in self.points.iter().filter(|p| p.value.is_some()) {
            best = match best {
                Some(current) if current.end_time >= point.end_time => Some(current),
                _ => Some(point),
            };
        }
        best.and_then(|p| p.value)
    }
}

/// Monitoring filter for the billing cost metric of one account. The id is
/// embedded in a quoted filter string, so it must be a plain account id.
pub fn billing_cost_filter(billing_account_id: &str) -> Result<String> {
    if billing_account_id.is_empty()
        || !billing_account_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SourceError::InvalidIdentifier(billing_account_id.to_string()));
    }
    Ok(format!(
        "metric.type=\"{}\" AND resource.labels.billing_account_id=\"{}\"",
        BILLING_COST_METRIC_TYPE, billing_account_id
    ))
}
