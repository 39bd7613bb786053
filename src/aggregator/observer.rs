// Diagnostic events raised during one aggregation pass. The aggregator reports
// through an injected observer; the binary forwards events to tracing.

use tracing::{error, info, warn};

use crate::models::TableStrategy;
use crate::warehouse::QueryKind;

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationEvent {
    TablesDiscovered {
        primary: String,
        resource: Option<String>,
        strategy: TableStrategy,
    },
    DiscoveryFailed {
        error: String,
    },
    GranularityCompleted {
        kind: QueryKind,
        samples: usize,
    },
    GranularityFailed {
        kind: QueryKind,
        error: String,
    },
    GranularitySkipped {
        kind: QueryKind,
        reason: &'static str,
    },
    /// Month-to-date query failed; retrying without the partition column.
    AlternativeQuery {
        error: String,
    },
    WarehouseFailed {
        error: String,
        permission_denied: bool,
    },
    BillingAccountMissing,
    MonitoringFailed {
        error: String,
    },
}

pub trait AggregationObserver: Send + Sync {
    fn on_event(&self, event: &AggregationEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AggregationObserver for TracingObserver {
    fn on_event(&self, event: &AggregationEvent) {
        match event {
            AggregationEvent::TablesDiscovered {
                primary,
                resource,
                strategy,
            } => info!(
                primary = %primary,
                resource = resource.as_deref().unwrap_or("none"),
                strategy = strategy.as_str(),
                "billing tables resolved"
            ),
            AggregationEvent::DiscoveryFailed { error } => {
                warn!(error = %error, "listing billing tables failed")
            }
            AggregationEvent::GranularityCompleted { kind, samples } => {
                info!(granularity = kind.as_str(), samples, "granularity collected")
            }
            AggregationEvent::GranularityFailed { kind, error } => {
                warn!(granularity = kind.as_str(), error = %error, "granularity query failed")
            }
            AggregationEvent::GranularitySkipped { kind, reason } => {
                info!(granularity = kind.as_str(), reason, "granularity skipped")
            }
            AggregationEvent::AlternativeQuery { error } => warn!(
                error = %error,
                "month-to-date query failed, trying alternative query without partition filter"
            ),
            AggregationEvent::WarehouseFailed {
                error,
                permission_denied,
            } => {
                if *permission_denied {
                    error!(error = %error, "permission denied accessing BigQuery");
                    error!("the service account needs BigQuery Data Viewer on the billing dataset");
                    error!("and BigQuery Job User on the project");
                } else {
                    warn!(error = %error, "BigQuery path failed, trying Cloud Monitoring");
                }
            }
            AggregationEvent::BillingAccountMissing => {
                warn!("no billing account found for project")
            }
            AggregationEvent::MonitoringFailed { error } => {
                error!(error = %error, "Cloud Monitoring fallback failed")
            }
        }
    }
}
