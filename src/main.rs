use anyhow::Result;
use billing_exporter::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use billing_exporter::aggregator::BillingAggregator;
use billing_exporter::aggregator::observer::TracingObserver;
use billing_exporter::config::GcpCredentials;
use billing_exporter::monitoring::MonitoringClient;
use billing_exporter::warehouse::BigQueryClient;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let gcp = &app_config.gcp;

    if let GcpCredentials::ServiceAccount { key_path } = &gcp.credentials {
        anyhow::ensure!(
            std::path::Path::new(key_path).exists(),
            "service account key file not found: {}",
            key_path
        );
    }

    let warehouse = Arc::new(
        BigQueryClient::new(&gcp.bigquery_endpoint, gcp.credentials.clone())
            .map_err(|e| anyhow::anyhow!("BigQuery client: {}", e))?,
    );
    let monitoring = Arc::new(
        MonitoringClient::new(
            &gcp.monitoring_endpoint,
            &gcp.billing_endpoint,
            gcp.credentials.clone(),
        )
        .map_err(|e| anyhow::anyhow!("Monitoring client: {}", e))?,
    );
    let aggregator = Arc::new(BillingAggregator::new(
        app_config.aggregator_settings(),
        warehouse,
        monitoring,
        Arc::new(TracingObserver),
    ));

    let app = routes::app(aggregator, &app_config.server.metrics_path);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        project = %gcp.project_id,
        dataset = %gcp.dataset,
        "Listening on http://{}{}",
        addr,
        app_config.server.metrics_path
    );

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}
