use serde::Deserialize;

use crate::aggregator::AggregatorSettings;
use crate::warehouse::TimeFilter;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub gcp: GcpConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Path the exposition text is served on (the root path always serves it too).
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            metrics_path: default_metrics_path(),
        }
    }
}

fn default_port() -> u16 {
    9091
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_metrics_path() -> String {
    "/metrics".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcpConfig {
    pub project_id: String,
    /// BigQuery dataset holding the billing export tables.
    pub dataset: String,
    /// May be empty: discovery then relies on table listing, and the monitoring
    /// fallback looks the account up through Cloud Billing.
    #[serde(default)]
    pub billing_account_id: String,
    #[serde(default)]
    pub credentials: GcpCredentials,
    #[serde(default = "default_bigquery_endpoint")]
    pub bigquery_endpoint: String,
    #[serde(default = "default_monitoring_endpoint")]
    pub monitoring_endpoint: String,
    #[serde(default = "default_billing_endpoint")]
    pub billing_endpoint: String,
}

fn default_bigquery_endpoint() -> String {
    "https://bigquery.googleapis.com".into()
}

fn default_monitoring_endpoint() -> String {
    "https://monitoring.googleapis.com".into()
}

fn default_billing_endpoint() -> String {
    "https://cloudbilling.googleapis.com".into()
}

/// How the exporter authenticates against Google APIs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GcpCredentials {
    /// Application Default Credentials (GOOGLE_APPLICATION_CREDENTIALS, metadata server, gcloud).
    #[default]
    Default,
    ServiceAccount { key_path: String },
    /// Pre-minted bearer token, e.g. from `gcloud auth print-access-token`.
    AccessToken { token: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Fixed offset of the reporting timezone, in minutes east of UTC.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_daily_lookback_days")]
    pub daily_lookback_days: u32,
    #[serde(default = "default_instance_min_cost")]
    pub instance_min_cost: f64,
    #[serde(default = "default_instance_row_limit")]
    pub instance_row_limit: u32,
    #[serde(default = "default_instance_service")]
    pub instance_service: String,
    #[serde(default = "default_vm_name_label")]
    pub vm_name_label: String,
    #[serde(default)]
    pub time_filter: TimeFilter,
    #[serde(default = "default_monitoring_window_days")]
    pub monitoring_window_days: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            daily_lookback_days: default_daily_lookback_days(),
            instance_min_cost: default_instance_min_cost(),
            instance_row_limit: default_instance_row_limit(),
            instance_service: default_instance_service(),
            vm_name_label: default_vm_name_label(),
            time_filter: TimeFilter::default(),
            monitoring_window_days: default_monitoring_window_days(),
        }
    }
}

fn default_utc_offset_minutes() -> i32 {
    330
}

fn default_daily_lookback_days() -> u32 {
    7
}

fn default_instance_min_cost() -> f64 {
    0.01
}

fn default_instance_row_limit() -> u32 {
    100
}

fn default_instance_service() -> String {
    "Compute Engine".into()
}

fn default_vm_name_label() -> String {
    "goog-compute-vm-name".into()
}

fn default_monitoring_window_days() -> u32 {
    30
}

/// Offsets are restricted to whole minutes within a day, like real zone offsets.
const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

const MAX_LOOKBACK_DAYS: u32 = 366;
const MAX_MONITORING_WINDOW_DAYS: u32 = 400;

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.server.metrics_path.starts_with('/'),
            "server.metrics_path must start with '/', got {:?}",
            self.server.metrics_path
        );
        anyhow::ensure!(
            !self.server.metrics_path.contains(['{', '}', '*']),
            "server.metrics_path must be a literal path without '{{', '}}' or '*', got {:?}",
            self.server.metrics_path
        );
        anyhow::ensure!(
            !self.gcp.project_id.trim().is_empty(),
            "gcp.project_id must be non-empty"
        );
        anyhow::ensure!(
            !self.gcp.dataset.trim().is_empty(),
            "gcp.dataset must be non-empty"
        );
        if let GcpCredentials::ServiceAccount { key_path } = &self.gcp.credentials {
            anyhow::ensure!(
                !key_path.is_empty(),
                "gcp.credentials.key_path must be non-empty"
            );
        }
        if let GcpCredentials::AccessToken { token } = &self.gcp.credentials {
            anyhow::ensure!(!token.is_empty(), "gcp.credentials.token must be non-empty");
        }
        anyhow::ensure!(
            self.aggregation.utc_offset_minutes.abs() <= MAX_OFFSET_MINUTES,
            "aggregation.utc_offset_minutes must be within +/-{}, got {}",
            MAX_OFFSET_MINUTES,
            self.aggregation.utc_offset_minutes
        );
        anyhow::ensure!(
            (1..=MAX_LOOKBACK_DAYS).contains(&self.aggregation.daily_lookback_days),
            "aggregation.daily_lookback_days must be between 1 and {}, got {}",
            MAX_LOOKBACK_DAYS,
            self.aggregation.daily_lookback_days
        );
        anyhow::ensure!(
            self.aggregation.instance_min_cost >= 0.0,
            "aggregation.instance_min_cost must be >= 0, got {}",
            self.aggregation.instance_min_cost
        );
        anyhow::ensure!(
            self.aggregation.instance_row_limit > 0,
            "aggregation.instance_row_limit must be > 0, got {}",
            self.aggregation.instance_row_limit
        );
        anyhow::ensure!(
            (1..=MAX_MONITORING_WINDOW_DAYS).contains(&self.aggregation.monitoring_window_days),
            "aggregation.monitoring_window_days must be between 1 and {}, got {}",
            MAX_MONITORING_WINDOW_DAYS,
            self.aggregation.monitoring_window_days
        );
        Ok(())
    }

    /// Settings handed to the aggregator; the aggregator never reads the environment itself.
    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            project_id: self.gcp.project_id.clone(),
            dataset: self.gcp.dataset.clone(),
            billing_account_id: self.gcp.billing_account_id.clone(),
            utc_offset_minutes: self.aggregation.utc_offset_minutes,
            daily_lookback_days: self.aggregation.daily_lookback_days,
            instance_min_cost: self.aggregation.instance_min_cost,
            instance_row_limit: self.aggregation.instance_row_limit,
            instance_service: self.aggregation.instance_service.clone(),
            vm_name_label: self.aggregation.vm_name_label.clone(),
            time_filter: self.aggregation.time_filter,
            monitoring_window_days: self.aggregation.monitoring_window_days,
        }
    }
}
