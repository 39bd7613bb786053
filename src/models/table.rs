// Billing export tables resolved for one scrape.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingTableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl BillingTableRef {
    pub fn new(project_id: &str, dataset_id: &str, table_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        }
    }
}

impl fmt::Display for BillingTableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Whether the primary table came from the dataset listing or was synthesized
/// from the billing account id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStrategy {
    Discovered,
    Guessed,
}

impl TableStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStrategy::Discovered => "discovered",
            TableStrategy::Guessed => "guessed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTables {
    /// Target of the month, daily and previous-month queries.
    pub primary: BillingTableRef,
    /// Detailed export; only the instance query reads it.
    pub resource: Option<BillingTableRef>,
    pub strategy: TableStrategy,
}
