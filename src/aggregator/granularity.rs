// Result rows to samples, one function per aggregate. Null costs read as 0.0,
// null currencies fall back, null dimensions become "Unknown"/"unknown".

use chrono::NaiveDate;

use crate::exposition::{
    BILLING_COST, BILLING_COST_DAILY, BILLING_COST_DAILY_BY_SERVICE, BILLING_COST_INSTANCE_DAILY,
    BILLING_COST_PREVIOUS_MONTH, BILLING_COST_TOTAL,
};
use crate::models::{Labels, MetricSample};
use crate::warehouse::Row;
use crate::warehouse::queries::{
    COL_CURRENCY, COL_DAILY_COST, COL_RESOURCE_NAME, COL_SERVICE_ID, COL_SERVICE_NAME,
    COL_TOTAL_COST, COL_USAGE_DATE, COL_VM_NAME,
};

pub const DEFAULT_CURRENCY: &str = "USD";

/// Labels every billing sample starts from.
#[derive(Debug, Clone, Copy)]
pub struct SampleContext<'a> {
    pub project: &'a str,
    pub billing_account_id: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthToDate {
    /// Per-service samples followed by the total sample.
    pub samples: Vec<MetricSample>,
    pub total: f64,
    /// Currency of the last row (default USD); later aggregates fall back to it.
    pub currency: String,
}

fn cost(row: &Row, column: &str) -> f64 {
    row.get_f64(column).unwrap_or(0.0)
}

fn currency<'r>(row: &'r Row, fallback: &'r str) -> &'r str {
    row.get(COL_CURRENCY).unwrap_or(fallback)
}

/// Date cell as a `YYYY-MM-DD` date, tolerating a timestamp suffix.
fn usage_date(row: &Row) -> Option<NaiveDate> {
    let raw = row.get(COL_USAGE_DATE)?;
    let date_part = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Rows for today or later (local) are dropped even though the query filters
/// them already; unparseable dates are dropped too.
fn complete_day(row: &Row, today_local: NaiveDate) -> Option<String> {
    usage_date(row)
        .filter(|d| *d < today_local)
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn month_to_date(rows: &[Row], ctx: SampleContext<'_>) -> MonthToDate {
    let mut samples = Vec::with_capacity(rows.len() + 1);
    let mut total = 0.0;
    let mut last_currency = DEFAULT_CURRENCY;
    for row in rows {
        let value = cost(row, COL_TOTAL_COST);
        total += value;
        last_currency = currency(row, DEFAULT_CURRENCY);
        let labels = Labels::new()
            .with("project", ctx.project)
            .with("service", row.get(COL_SERVICE_NAME).unwrap_or("Unknown"))
            .with("service_id", row.get(COL_SERVICE_ID).unwrap_or("unknown"))
            .with("currency", last_currency);
        samples.push(MetricSample::new(BILLING_COST, labels, value));
    }
    let currency = last_currency.to_string();
    samples.push(MetricSample::new(
        BILLING_COST_TOTAL,
        account_labels(ctx, &currency),
        total,
    ));
    MonthToDate {
        samples,
        total,
        currency,
    }
}

fn account_labels(ctx: SampleContext<'_>, currency: &str) -> Labels {
    Labels::new()
        .with("project", ctx.project)
        .with("billing_account_id", ctx.billing_account_id)
        .with("currency", currency)
}

pub fn daily(
    rows: &[Row],
    ctx: SampleContext<'_>,
    fallback_currency: &str,
    today_local: NaiveDate,
) -> Vec<MetricSample> {
    rows.iter()
        .filter_map(|row| {
            let date = complete_day(row, today_local)?;
            let labels = Labels::new()
                .with("project", ctx.project)
                .with("date", date)
                .with("currency", currency(row, fallback_currency));
            Some(MetricSample::new(
                BILLING_COST_DAILY,
                labels,
                cost(row, COL_DAILY_COST),
            ))
        })
        .collect()
}

pub fn daily_by_service(
    rows: &[Row],
    ctx: SampleContext<'_>,
    fallback_currency: &str,
    today_local: NaiveDate,
) -> Vec<MetricSample> {
    rows.iter()
        .filter_map(|row| {
            let date = complete_day(row, today_local)?;
            let labels = Labels::new()
                .with("project", ctx.project)
                .with("date", date)
                .with("service", row.get(COL_SERVICE_NAME).unwrap_or("Unknown"))
                .with("service_id", row.get(COL_SERVICE_ID).unwrap_or("unknown"))
                .with("currency", currency(row, fallback_currency));
            Some(MetricSample::new(
                BILLING_COST_DAILY_BY_SERVICE,
                labels,
                cost(row, COL_DAILY_COST),
            ))
        })
        .collect()
}

/// VM label first, then the resource name; paths reduce to their last segment.
pub fn instance_name(row: &Row) -> String {
    let name = row
        .get(COL_VM_NAME)
        .or_else(|| row.get(COL_RESOURCE_NAME))
        .unwrap_or("unknown");
    name.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(name)
        .to_string()
}

pub fn instance_daily(
    rows: &[Row],
    ctx: SampleContext<'_>,
    fallback_currency: &str,
    today_local: NaiveDate,
) -> Vec<MetricSample> {
    rows.iter()
        .filter_map(|row| {
            let date = complete_day(row, today_local)?;
            let labels = Labels::new()
                .with("project", ctx.project)
                .with("date", date)
                .with("vm_name", instance_name(row))
                .with("currency", currency(row, fallback_currency));
            Some(MetricSample::new(
                BILLING_COST_INSTANCE_DAILY,
                labels,
                cost(row, COL_DAILY_COST),
            ))
        })
        .collect()
}

/// Sum over currency rows (normally one). No rows yields a zero sample.
pub fn previous_month(
    rows: &[Row],
    ctx: SampleContext<'_>,
    fallback_currency: &str,
) -> MetricSample {
    let mut total = 0.0;
    let mut last_currency = fallback_currency;
    for row in rows {
        total += cost(row, COL_TOTAL_COST);
        last_currency = currency(row, fallback_currency);
    }
    previous_month_sample(ctx, last_currency, total)
}

pub fn previous_month_sample(ctx: SampleContext<'_>, currency: &str, value: f64) -> MetricSample {
    MetricSample::new(
        BILLING_COST_PREVIOUS_MONTH,
        account_labels(ctx, currency),
        value,
    )
}
