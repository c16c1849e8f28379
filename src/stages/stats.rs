// src/stages/stats.rs - statistical aggregation over log records
use crate::error::QueryError;
use crate::model::{CellValue, Record, Table};
use crate::query::StageSpec;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;

static AGG_EXPR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)\((.*)\)$").unwrap());

/// Joins group-by value tuples into one partition key. Not validated
/// against values that themselves contain the separator.
const GROUP_KEY_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggFunc {
    Count,
    Avg,
    Sum,
    Min,
    Max,
    Dc,
}

/// One aggregation expression such as `count` or `avg(dur)`.
#[derive(Debug, Clone)]
pub struct AggSpec {
    pub func: AggFunc,
    pub field: Option<String>,
}

impl AggSpec {
    pub fn count() -> Self {
        AggSpec {
            func: AggFunc::Count,
            field: None,
        }
    }

    pub fn parse(token: &str, stage: &str) -> Result<AggSpec, QueryError> {
        if token.eq_ignore_ascii_case("count") {
            return Ok(AggSpec::count());
        }

        let invalid = |message: &str| QueryError::InvalidArgument {
            stage: stage.to_string(),
            value: token.to_string(),
            message: message.to_string(),
        };

        let caps = AGG_EXPR
            .captures(token)
            .ok_or_else(|| invalid("expected count or name(field)"))?;
        let name = caps[1].to_lowercase();
        let field = caps[2].trim().to_string();

        let func = match name.as_str() {
            "count" => return Ok(AggSpec::count()),
            "avg" => AggFunc::Avg,
            "sum" => AggFunc::Sum,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            "dc" => AggFunc::Dc,
            _ => return Err(invalid("unknown aggregation function")),
        };
        if field.is_empty() {
            return Err(invalid("aggregation needs a field"));
        }

        Ok(AggSpec {
            func,
            field: Some(field),
        })
    }

    /// Column name for this aggregation's output.
    pub fn label(&self) -> String {
        match (&self.func, &self.field) {
            (AggFunc::Count, _) => "count".to_string(),
            (func, Some(field)) => format!("{}({})", func_name(*func), field),
            (func, None) => func_name(*func).to_string(),
        }
    }

    pub fn compute(&self, records: &[&Record]) -> f64 {
        match self.func {
            AggFunc::Count => records.len() as f64,
            AggFunc::Dc => {
                let mut distinct = HashSet::new();
                if let Some(field) = &self.field {
                    for record in records {
                        if let Some(value) = record.fields.get(field) {
                            distinct.insert(value.as_str());
                        }
                    }
                }
                distinct.len() as f64
            }
            AggFunc::Avg | AggFunc::Sum | AggFunc::Min | AggFunc::Max => {
                let values: Vec<f64> = match &self.field {
                    Some(field) => records
                        .iter()
                        .filter_map(|r| r.fields.get(field))
                        .filter_map(|v| coerce_numeric(v))
                        .collect(),
                    None => Vec::new(),
                };
                // Zero numeric samples yield 0 by convention.
                if values.is_empty() {
                    return 0.0;
                }
                match self.func {
                    AggFunc::Avg => values.iter().sum::<f64>() / values.len() as f64,
                    AggFunc::Sum => values.iter().sum(),
                    AggFunc::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                    AggFunc::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    _ => 0.0,
                }
            }
        }
    }
}

fn func_name(func: AggFunc) -> &'static str {
    match func {
        AggFunc::Count => "count",
        AggFunc::Avg => "avg",
        AggFunc::Sum => "sum",
        AggFunc::Min => "min",
        AggFunc::Max => "max",
        AggFunc::Dc => "dc",
    }
}

/// Numeric coercion for aggregation inputs: strip everything that is not a
/// digit or a dot, then parse. `"120ms"` becomes `120`; values that still
/// fail to parse are skipped by the caller.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

#[derive(Debug)]
pub struct StatsStage {
    pub aggs: Vec<AggSpec>,
    pub group_by: Vec<String>,
}

impl StatsStage {
    pub fn build(spec: &StageSpec) -> Result<StatsStage, QueryError> {
        let (agg_tokens, group_by) = super::split_on_by(&spec.args);
        let aggs = super::parse_aggregations(&agg_tokens, "stats")?;
        Ok(StatsStage { aggs, group_by })
    }

    pub fn execute(&self, records: &[Record]) -> Table {
        let mut columns = self.group_by.clone();
        columns.extend(self.aggs.iter().map(|a| a.label()));

        let mut rows = Vec::new();
        if self.group_by.is_empty() {
            let all: Vec<&Record> = records.iter().collect();
            let mut row = IndexMap::new();
            for agg in &self.aggs {
                row.insert(agg.label(), CellValue::Num(agg.compute(&all)));
            }
            rows.push(row);
        } else {
            // Partition in first-seen group order.
            let mut groups: IndexMap<String, (Vec<String>, Vec<&Record>)> = IndexMap::new();
            for record in records {
                let values: Vec<String> = self
                    .group_by
                    .iter()
                    .map(|f| record.fields.get(f).cloned().unwrap_or_default())
                    .collect();
                let key = values.join(GROUP_KEY_SEPARATOR);
                groups
                    .entry(key)
                    .or_insert_with(|| (values, Vec::new()))
                    .1
                    .push(record);
            }

            for (_, (values, members)) in &groups {
                let mut row = IndexMap::new();
                for (field, value) in self.group_by.iter().zip(values) {
                    row.insert(field.clone(), CellValue::Str(value.clone()));
                }
                for agg in &self.aggs {
                    row.insert(agg.label(), CellValue::Num(agg.compute(members)));
                }
                rows.push(row);
            }

            // Descending by the first aggregation; stable on ties.
            if let Some(first) = self.aggs.first() {
                let label = first.label();
                rows.sort_by(|a, b| {
                    let av = a.get(&label).and_then(CellValue::as_number).unwrap_or(0.0);
                    let bv = b.get(&label).and_then(CellValue::as_number).unwrap_or(0.0);
                    bv.partial_cmp(&av).unwrap_or(Ordering::Equal)
                });
            }
        }

        Table {
            columns,
            rows,
            source_hits: records.len(),
        }
    }
}
