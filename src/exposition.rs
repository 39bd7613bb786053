// Prometheus text exposition: metric catalog, label escaping, rendering.

use std::collections::HashSet;
use std::fmt::Write;

use crate::models::{Entry, MetricSample};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub const BILLING_COST: &str = "gcp_billing_cost";
pub const BILLING_COST_TOTAL: &str = "gcp_billing_cost_total";
pub const BILLING_COST_PREVIOUS_MONTH: &str = "gcp_billing_cost_previous_month";
pub const BILLING_COST_DAILY: &str = "gcp_billing_cost_daily";
pub const BILLING_COST_DAILY_BY_SERVICE: &str = "gcp_billing_cost_daily_by_service";
pub const BILLING_COST_INSTANCE_DAILY: &str = "gcp_billing_cost_instance_daily";
pub const EXPORTER_UP: &str = "gcp_billing_exporter_up";
pub const EXPORTER_ERROR: &str = "gcp_billing_exporter_error";

/// HELP text for every metric the exporter declares. All of them are gauges.
pub fn help_text(name: &str) -> Option<&'static str> {
    let help = match name {
        BILLING_COST => "Billing cost per service for the current month",
        BILLING_COST_TOTAL => "Total billing cost for the current month",
        BILLING_COST_PREVIOUS_MONTH => "Total billing cost for the previous calendar month",
        BILLING_COST_DAILY => "Daily billing cost (complete days only)",
        BILLING_COST_DAILY_BY_SERVICE => "Daily billing cost per service (by date)",
        BILLING_COST_INSTANCE_DAILY => "Daily billing cost per VM instance",
        EXPORTER_UP => "Whether the exporter is working",
        EXPORTER_ERROR => "Error status",
        _ => return None,
    };
    Some(help)
}

/// Escape a label value: backslash, double quote and newline.
pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Label names from external sources: anything outside `[a-zA-Z0-9_]` becomes `_`,
/// and a leading digit gets a `_` prefix.
pub fn sanitize_label_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Replace control characters so a comment stays on one line.
pub fn sanitize_comment(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".into()
    } else if value == f64::INFINITY {
        "+Inf".into()
    } else if value == f64::NEG_INFINITY {
        "-Inf".into()
    } else {
        value.to_string()
    }
}

fn render_sample(out: &mut String, sample: &MetricSample) {
    out.push_str(sample.name);
    if !sample.labels.is_empty() {
        out.push('{');
        for (i, (key, value)) in sample.labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}=\"{}\"", key, escape_label_value(value));
        }
        out.push('}');
    }
    let _ = writeln!(out, " {}", format_value(sample.value));
}

/// Render entries as exposition text. HELP/TYPE lines precede the first sample of
/// each metric name; the whole text is rebuilt on every call.
pub fn render(entries: &[Entry]) -> String {
    let mut out = String::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for entry in entries {
        match entry {
            Entry::Sample(sample) => {
                if seen.insert(sample.name) {
                    if let Some(help) = help_text(sample.name) {
                        let _ = writeln!(out, "# HELP {} {}", sample.name, help);
                    }
                    let _ = writeln!(out, "# TYPE {} gauge", sample.name);
                }
                render_sample(&mut out, sample);
            }
            Entry::Comment(text) => {
                let _ = writeln!(out, "# {}", sanitize_comment(text));
            }
        }
    }
    out
}
