// Cloud Monitoring v3 timeSeries.list and Cloud Billing v1 billingInfo over REST.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::{MonitoringSource, Point, TimeSeries};
use crate::auth::{BILLING_SCOPES, GcpAuth, MONITORING_SCOPES};
use crate::config::GcpCredentials;
use crate::error::Result;
use crate::rest::{decode_json, endpoint, http_client, next_page};

pub struct MonitoringClient {
    http: reqwest::Client,
    monitoring_auth: GcpAuth,
    billing_auth: GcpAuth,
    monitoring_url: String,
    billing_url: String,
}

impl MonitoringClient {
    pub fn new(
        monitoring_url: &str,
        billing_url: &str,
        credentials: GcpCredentials,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            monitoring_auth: GcpAuth::new(credentials.clone(), MONITORING_SCOPES),
            billing_auth: GcpAuth::new(credentials, BILLING_SCOPES),
            monitoring_url: monitoring_url.to_string(),
            billing_url: billing_url.to_string(),
        })
    }
}

#[async_trait]
impl MonitoringSource for MonitoringClient {
    async fn billing_account_id(&self, project: &str) -> Result<Option<String>> {
        let authorization = self.billing_auth.authorization().await?;
        let url = endpoint(
            &self.billing_url,
            &format!("v1/projects/{}/billingInfo", project),
        );
        let response = self
            .http
            .get(url)
            .header("Authorization", &authorization)
            .send()
            .await?;
        let info: BillingInfo = decode_json(response).await?;
        Ok(info
            .billing_account_name
            .as_deref()
            .and_then(|name| name.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string))
    }

    async fn list_time_series(
        &self,
        project: &str,
        filter: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeries>> {
        let authorization = self.monitoring_auth.authorization().await?;
        let url = endpoint(
            &self.monitoring_url,
            &format!("v3/projects/{}/timeSeries", project),
        );
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("filter", filter.to_string()),
                (
                    "interval.startTime",
                    start.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    "interval.endTime",
                    end.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("view", "FULL".to_string()),
            ];
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
            let page: ListTimeSeriesResponse = decode_json(response).await?;
            out.extend(page.time_series.into_iter().map(TimeSeries::from));
            page_token = next_page(page.next_page_token);
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillingInfo {
    billing_account_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTimeSeriesResponse {
    #[serde(default)]
    time_series: Vec<WireTimeSeries>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTimeSeries {
    metric: Option<WireLabels>,
    resource: Option<WireLabels>,
    #[serde(default)]
    points: Vec<WirePoint>,
}

#[derive(Debug, Deserialize)]
struct WireLabels {
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WirePoint {
    interval: Option<WireInterval>,
    value: Option<WireValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInterval {
    end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue {
    double_value: Option<f64>,
    /// int64 values are JSON strings in the REST encoding.
    int64_value: Option<String>,
}

impl From<WireTimeSeries> for TimeSeries {
    fn from(wire: WireTimeSeries) -> Self {
        TimeSeries {
            resource_labels: wire.resource.map(|r| r.labels).unwrap_or_default(),
            metric_labels: wire.metric.map(|m| m.labels).unwrap_or_default(),
            points: wire
                .points
                .into_iter()
                .map(|p| Point {
                    end_time: p
                        .interval
                        .and_then(|i| i.end_time)
                        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                        .map(|t| t.with_timezone(&Utc)),
                    value: p.value.and_then(|v| {
                        v.double_value
                            .or_else(|| v.int64_value.and_then(|s| s.parse().ok()))
                    }),
                })
                .collect(),
        }
    }
}
