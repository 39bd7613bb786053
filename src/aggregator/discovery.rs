// Billing export table discovery: list the dataset once per scrape and classify
// table names. Standard export is the primary target; the resource export is
// only read by the instance query.

use super::observer::{AggregationEvent, AggregationObserver};
use crate::models::{BillingTableRef, DiscoveredTables, TableStrategy};
use crate::warehouse::Warehouse;

pub const STANDARD_EXPORT_MARKER: &str = "gcp_billing_export_v1_";
pub const RESOURCE_EXPORT_MARKER: &str = "gcp_billing_export_resource_v1_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Standard,
    Resource,
}

pub fn classify(table_id: &str) -> Option<ExportKind> {
    if table_id.contains(RESOURCE_EXPORT_MARKER) {
        Some(ExportKind::Resource)
    } else if table_id.contains(STANDARD_EXPORT_MARKER) && !table_id.contains("resource") {
        Some(ExportKind::Standard)
    } else {
        None
    }
}

/// Conventional standard-export name for a billing account (`-` becomes `_`).
pub fn guessed_table_name(billing_account_id: &str) -> String {
    format!(
        "{}{}",
        STANDARD_EXPORT_MARKER,
        billing_account_id.replace('-', "_")
    )
}

/// Pick tables from a listing. First match of each kind wins.
pub fn select_tables(
    project: &str,
    dataset: &str,
    billing_account_id: &str,
    table_ids: &[String],
) -> DiscoveredTables {
    let standard = table_ids
        .iter()
        .find(|t| classify(t) == Some(ExportKind::Standard));
    let resource = table_ids
        .iter()
        .find(|t| classify(t) == Some(ExportKind::Resource));

    let (primary, strategy) = match standard.or(resource) {
        Some(table) => (table.clone(), TableStrategy::Discovered),
        None => (guessed_table_name(billing_account_id), TableStrategy::Guessed),
    };

    DiscoveredTables {
        primary: BillingTableRef::new(project, dataset, &primary),
        resource: resource.map(|t| BillingTableRef::new(project, dataset, t)),
        strategy,
    }
}

/// List and select. A failed listing is not retried: the guessed name is used and
/// any problem with it surfaces when the queries run.
pub async fn discover(
    warehouse: &dyn Warehouse,
    observer: &dyn AggregationObserver,
    project: &str,
    dataset: &str,
    billing_account_id: &str,
) -> DiscoveredTables {
    let table_ids = match warehouse.list_tables(project, dataset).await {
        Ok(ids) => ids,
        Err(e) => {
            observer.on_event(&AggregationEvent::DiscoveryFailed {
                error: e.to_string(),
            });
            Vec::new()
        }
    };
    let tables = select_tables(project, dataset, billing_account_id, &table_ids);
    observer.on_event(&AggregationEvent::TablesDiscovered {
        primary: tables.primary.to_string(),
        resource: tables.resource.as_ref().map(ToString::to_string),
        strategy: tables.strategy,
    });
    tables
}
