// Date windows for each query, derived from "now" in the fixed reporting offset.
// Warehouse timestamps are UTC; bounds are rendered as YYYY-MM-DD and compared
// with TIMESTAMP(@date), i.e. UTC midnight of that calendar date.

use chrono::{
    DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, Utc,
};

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindows {
    pub offset: FixedOffset,
    /// Current calendar date in the reporting offset. Daily rows must be strictly before it.
    pub today_local: NaiveDate,
    /// First of the local month through local today. Local dates are used as UTC
    /// date strings directly, which is off by the offset at both ends.
    pub month_to_date: DateRange,
    /// First day of the prior local month through the first of this month (exclusive).
    pub previous_month: DateRange,
    /// Both bounds are local midnights shifted to UTC: the lower one `lookback + 1`
    /// days ago rounded down, the upper one today rounded up to a whole UTC date,
    /// so the scan covers every complete local day and the `< today` filter trims
    /// the partial one.
    pub daily: DateRange,
}

impl TimeWindows {
    pub fn compute(now: DateTime<Utc>, offset: FixedOffset, lookback_days: u32) -> Self {
        let today_local = now.with_timezone(&offset).date_naive();

        let month_start = first_of_month(today_local);
        let previous_month_last_day = month_start - Days::new(1);
        let previous_month_start = first_of_month(previous_month_last_day);

        let daily_local_start = today_local
            .checked_sub_days(Days::new(u64::from(lookback_days) + 1))
            .unwrap_or(NaiveDate::MIN);
        let daily_start_utc = local_midnight_in_utc(daily_local_start, offset).date();
        let today_midnight_utc = local_midnight_in_utc(today_local, offset);
        let daily_end_utc = if today_midnight_utc.time() == NaiveTime::MIN {
            today_midnight_utc.date()
        } else {
            today_midnight_utc.date().succ_opt().unwrap_or(NaiveDate::MAX)
        };

        Self {
            offset,
            today_local,
            month_to_date: DateRange {
                start: month_start,
                end: today_local,
            },
            previous_month: DateRange {
                start: previous_month_start,
                end: month_start,
            },
            daily: DateRange {
                start: daily_start_utc,
                end: daily_end_utc,
            },
        }
    }

    pub fn today_local_str(&self) -> String {
        self.today_local.format("%Y-%m-%d").to_string()
    }

    pub fn previous_month_last_day(&self) -> NaiveDate {
        self.previous_month.end - Days::new(1)
    }

    /// Offset as a warehouse time zone literal, e.g. `+05:30`.
    pub fn time_zone(&self) -> String {
        format_offset(self.offset)
    }
}

/// Local midnight of `date` as a UTC wall-clock time. Saturates at the calendar limits.
fn local_midnight_in_utc(date: NaiveDate, offset: FixedOffset) -> NaiveDateTime {
    let midnight = date.and_time(NaiveTime::MIN);
    midnight
        .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
        .unwrap_or(midnight)
}

/// Fixed offset from minutes east of UTC; out-of-range values fall back to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

pub fn format_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    date - Days::new(u64::from(date.day0()))
}
