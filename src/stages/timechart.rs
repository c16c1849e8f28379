// src/stages/timechart.rs - time-bucketed event counting
use crate::error::QueryError;
use crate::model::{Record, Series, TimeChartResult};
use crate::query::StageSpec;
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

static SPAN_EXPR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s*([A-Za-z]*)$").unwrap());

const DEFAULT_SPAN: &str = "1h";
const HOUR_MS: i64 = 3_600_000;

/// Counts records into contiguous, fixed-width time buckets, optionally
/// split into one series per value of a field. Per-bucket values are counts
/// only; other aggregation functions per bucket are out of scope.
#[derive(Debug)]
pub struct TimeChartStage {
    pub span_ms: i64,
    pub split_field: Option<String>,
}

impl TimeChartStage {
    pub fn build(spec: &StageSpec) -> Result<TimeChartStage, QueryError> {
        let span_text = spec
            .params
            .get("span")
            .map(String::as_str)
            .unwrap_or(DEFAULT_SPAN);
        let span_ms = parse_span(span_text)?;

        let (agg_tokens, group_by) = super::split_on_by(&spec.args);
        if agg_tokens.iter().any(|t| !t.eq_ignore_ascii_case("count")) {
            // Per-bucket values are counts; other aggregations are not
            // supported here.
            tracing::warn!(?agg_tokens, "timechart counts only, ignoring aggregations");
        }
        if group_by.len() > 1 {
            // Only a single split field is supported.
            tracing::warn!(
                extra = ?&group_by[1..],
                "timechart splits on one field, ignoring the rest"
            );
        }
        let split_field = group_by.first().cloned();

        Ok(TimeChartStage {
            span_ms,
            split_field,
        })
    }

    pub fn execute(&self, records: &[Record]) -> TimeChartResult {
        let span = self.span_ms;
        let stamped: Vec<(&Record, i64)> = records
            .iter()
            .filter_map(|r| r.timestamp.map(|ts| (r, ts)))
            .collect();

        // Without any timestamps there is nothing to bucket.
        let Some(min) = stamped.iter().map(|(_, ts)| *ts).min() else {
            return TimeChartResult {
                labels: Vec::new(),
                series: Vec::new(),
                span_ms: span,
            };
        };
        let max = stamped.iter().map(|(_, ts)| *ts).max().unwrap_or(min);

        let first_bucket = min.div_euclid(span) * span;
        let last_bucket = max.div_euclid(span) * span;
        let bucket_count = ((last_bucket - first_bucket) / span + 1) as usize;

        let labels: Vec<String> = (0..bucket_count)
            .map(|i| format_bucket(first_bucket + i as i64 * span))
            .collect();

        let mut series: IndexMap<String, Vec<f64>> = IndexMap::new();
        if self.split_field.is_none() {
            series.insert("count".to_string(), vec![0.0; bucket_count]);
        }

        for (record, ts) in &stamped {
            let bucket = ts.div_euclid(span) * span;
            let index = ((bucket - first_bucket) / span) as usize;
            let name = match &self.split_field {
                None => "count".to_string(),
                Some(field) => record.fields.get(field).cloned().unwrap_or_default(),
            };
            series
                .entry(name)
                .or_insert_with(|| vec![0.0; bucket_count])[index] += 1.0;
        }

        TimeChartResult {
            labels,
            series: series
                .into_iter()
                .map(|(name, values)| Series { name, values })
                .collect(),
            span_ms: span,
        }
    }
}

/// Parse a span like `5m` or `1h` into milliseconds. An unrecognized unit
/// keeps the documented one-hour default; a malformed or zero count rejects
/// the query.
pub fn parse_span(text: &str) -> Result<i64, QueryError> {
    let invalid = |message: &str| QueryError::InvalidArgument {
        stage: "timechart".to_string(),
        value: text.to_string(),
        message: message.to_string(),
    };

    let caps = SPAN_EXPR
        .captures(text.trim())
        .ok_or_else(|| invalid("expected <integer><unit>"))?;
    let count: i64 = caps[1].parse().map_err(|_| invalid("count out of range"))?;
    if count == 0 {
        return Err(invalid("span must be positive"));
    }

    let unit_ms = match &caps[2] {
        "s" => 1_000,
        "m" => 60_000,
        "h" => HOUR_MS,
        "d" => 24 * HOUR_MS,
        other => {
            tracing::warn!(unit = other, "unrecognized span unit, defaulting to 1h");
            return Ok(HOUR_MS);
        }
    };
    Ok(count * unit_ms)
}

/// Bucket labels are formatted in UTC. The original behavior used the
/// process-local zone; UTC keeps labels deterministic across hosts.
fn format_bucket(ts_ms: i64) -> String {
    match Utc.timestamp_millis_opt(ts_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts_ms.to_string(),
    }
}
