// SQL for each billing aggregate. Values are always bound parameters; table
// identifiers cannot be, so they are validated and backtick-quoted instead.

use super::{BillingQuery, QueryKind, QueryParam, TimeFilter};
use crate::error::{Result, SourceError};
use crate::models::BillingTableRef;
use crate::windows::{DateRange, TimeWindows};

pub const COL_TOTAL_COST: &str = "total_cost";
pub const COL_DAILY_COST: &str = "daily_cost";
pub const COL_SERVICE_NAME: &str = "service_name";
pub const COL_SERVICE_ID: &str = "service_id";
pub const COL_CURRENCY: &str = "currency";
pub const COL_USAGE_DATE: &str = "usage_date";
pub const COL_VM_NAME: &str = "vm_name";
pub const COL_RESOURCE_NAME: &str = "resource_name";

/// `` `project.dataset.table` `` after checking every part.
pub fn quoted_table(table: &BillingTableRef) -> Result<String> {
    check_identifier(&table.project_id, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ':')
    })?;
    check_identifier(&table.dataset_id, |c| c.is_ascii_alphanumeric() || c == '_')?;
    check_identifier(&table.table_id, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-')
    })?;
    Ok(format!("`{}`", table))
}

fn check_identifier(value: &str, allowed: impl Fn(char) -> bool) -> Result<()> {
    if value.is_empty() || !value.chars().all(allowed) {
        return Err(SourceError::InvalidIdentifier(value.to_string()));
    }
    Ok(())
}

fn time_predicate(filter: TimeFilter) -> &'static str {
    match filter {
        TimeFilter::PartitionTime => {
            "(_PARTITIONTIME >= TIMESTAMP(@start_date) AND _PARTITIONTIME < TIMESTAMP(@end_date))"
        }
        TimeFilter::UsageStartTime => {
            "(usage_start_time >= TIMESTAMP(@start_date) AND usage_start_time < TIMESTAMP(@end_date))"
        }
        TimeFilter::Either => {
            "((_PARTITIONTIME >= TIMESTAMP(@start_date) AND _PARTITIONTIME < TIMESTAMP(@end_date))
            OR (usage_start_time >= TIMESTAMP(@start_date) AND usage_start_time < TIMESTAMP(@end_date)))"
        }
    }
}

fn range_params(range: &DateRange) -> Vec<QueryParam> {
    vec![
        QueryParam::string("start_date", range.start_str()),
        QueryParam::string("end_date", range.end_str()),
    ]
}

fn local_date_params(windows: &TimeWindows) -> Vec<QueryParam> {
    vec![
        QueryParam::string("local_tz", windows.time_zone()),
        QueryParam::date("today_local", windows.today_local_str()),
    ]
}

pub fn month_to_date(
    table: &BillingTableRef,
    windows: &TimeWindows,
    filter: TimeFilter,
) -> Result<BillingQuery> {
    let sql = format!(
        "SELECT
            SUM(cost) AS total_cost,
            service.description AS service_name,
            service.id AS service_id,
            currency
        FROM {table}
        WHERE {predicate}
        GROUP BY service_name, service_id, currency
        ORDER BY total_cost DESC",
        table = quoted_table(table)?,
        predicate = time_predicate(filter),
    );
    Ok(BillingQuery {
        kind: QueryKind::MonthToDate,
        project_id: table.project_id.clone(),
        sql,
        params: range_params(&windows.month_to_date),
    })
}

pub fn month_to_date_alternative(
    table: &BillingTableRef,
    windows: &TimeWindows,
    billing_account_id: &str,
) -> Result<BillingQuery> {
    let sql = format!(
        "SELECT
            SUM(cost) AS total_cost,
            service.description AS service_name,
            service.id AS service_id,
            currency
        FROM {table}
        WHERE billing_account_id = @billing_account_id
            AND usage_start_time >= TIMESTAMP(@start_date)
            AND usage_start_time < TIMESTAMP(@end_date)
        GROUP BY service_name, service_id, currency
        ORDER BY total_cost DESC",
        table = quoted_table(table)?,
    );
    let mut params = range_params(&windows.month_to_date);
    params.push(QueryParam::string("billing_account_id", billing_account_id));
    Ok(BillingQuery {
        kind: QueryKind::MonthToDateAlternative,
        project_id: table.project_id.clone(),
        sql,
        params,
    })
}

pub fn daily(
    table: &BillingTableRef,
    windows: &TimeWindows,
    filter: TimeFilter,
) -> Result<BillingQuery> {
    let sql = format!(
        "SELECT
            DATE(usage_start_time, @local_tz) AS usage_date,
            SUM(cost) AS daily_cost,
            currency
        FROM {table}
        WHERE {predicate}
        GROUP BY usage_date, currency
        HAVING usage_date < @today_local
        ORDER BY usage_date DESC",
        table = quoted_table(table)?,
        predicate = time_predicate(filter),
    );
    let mut params = range_params(&windows.daily);
    params.extend(local_date_params(windows));
    Ok(BillingQuery {
        kind: QueryKind::Daily,
        project_id: table.project_id.clone(),
        sql,
        params,
    })
}

pub fn daily_by_service(
    table: &BillingTableRef,
    windows: &TimeWindows,
    filter: TimeFilter,
) -> Result<BillingQuery> {
    let sql = format!(
        "SELECT
            DATE(usage_start_time, @local_tz) AS usage_date,
            service.description AS service_name,
            service.id AS service_id,
            SUM(cost) AS daily_cost,
            currency
        FROM {table}
        WHERE {predicate}
        GROUP BY usage_date, service_name, service_id, currency
        HAVING usage_date < @today_local
        ORDER BY usage_date DESC, daily_cost DESC",
        table = quoted_table(table)?,
        predicate = time_predicate(filter),
    );
    let mut params = range_params(&windows.daily);
    params.extend(local_date_params(windows));
    Ok(BillingQuery {
        kind: QueryKind::DailyByService,
        project_id: table.project_id.clone(),
        sql,
        params,
    })
}

/// Knobs for the per-instance query on the detailed export.
#[derive(Debug, Clone)]
pub struct InstanceFilter<'a> {
    pub service: &'a str,
    pub vm_name_label: &'a str,
    pub min_cost: f64,
    pub row_limit: u32,
}

pub fn instance_daily(
    resource_table: &BillingTableRef,
    windows: &TimeWindows,
    filter: TimeFilter,
    instance: &InstanceFilter<'_>,
) -> Result<BillingQuery> {
    // LIMIT takes an integer literal; row_limit is a u32 so it cannot carry SQL.
    let sql = format!(
        "SELECT
            DATE(usage_start_time, @local_tz) AS usage_date,
            (SELECT value FROM UNNEST(labels) WHERE key = @vm_name_label LIMIT 1) AS vm_name,
            resource.name AS resource_name,
            SUM(cost) AS daily_cost,
            currency
        FROM {table}
        WHERE {predicate}
            AND service.description = @service
        GROUP BY usage_date, vm_name, resource_name, currency
        HAVING usage_date < @today_local
            AND daily_cost > @min_cost
        ORDER BY daily_cost DESC
        LIMIT {limit}",
        table = quoted_table(resource_table)?,
        predicate = time_predicate(filter),
        limit = instance.row_limit,
    );
    let mut params = range_params(&windows.daily);
    params.extend(local_date_params(windows));
    params.push(QueryParam::string("vm_name_label", instance.vm_name_label));
    params.push(QueryParam::string("service", instance.service));
    params.push(QueryParam::float("min_cost", instance.min_cost));
    Ok(BillingQuery {
        kind: QueryKind::InstanceDaily,
        project_id: resource_table.project_id.clone(),
        sql,
        params,
    })
}

pub fn previous_month(
    table: &BillingTableRef,
    windows: &TimeWindows,
    filter: TimeFilter,
) -> Result<BillingQuery> {
    let sql = format!(
        "SELECT
            SUM(cost) AS total_cost,
            currency
        FROM {table}
        WHERE {predicate}
        GROUP BY currency",
        table = quoted_table(table)?,
        predicate = time_predicate(filter),
    );
    Ok(BillingQuery {
        kind: QueryKind::PreviousMonth,
        project_id: table.project_id.clone(),
        sql,
        params: range_params(&windows.previous_month),
    })
}
