// Domain models: exposition samples and billing table references.

mod sample;
mod table;

pub use sample::{Entry, Labels, MetricSample};
pub use table::{BillingTableRef, DiscoveredTables, TableStrategy};
