// src/stages/filter.rs
use crate::error::QueryError;
use crate::model::PipeResult;
use crate::query::StageSpec;
use regex::Regex;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    NotRegex,
}

impl FilterOp {
    fn parse(token: &str, stage: &str) -> Result<FilterOp, QueryError> {
        match token.to_lowercase().as_str() {
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" => Ok(FilterOp::Ne),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::Ge),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::Le),
            "contains" => Ok(FilterOp::Contains),
            "startswith" => Ok(FilterOp::StartsWith),
            "endswith" => Ok(FilterOp::EndsWith),
            "regex" | "match" => Ok(FilterOp::Regex),
            "!regex" | "notmatch" => Ok(FilterOp::NotRegex),
            _ => Err(QueryError::InvalidArgument {
                stage: stage.to_string(),
                value: token.to_string(),
                message: "not a filter operator".to_string(),
            }),
        }
    }
}

/// Predicate over one field. Applies to log records and table rows; a
/// missing field never matches.
#[derive(Debug)]
pub struct FilterStage {
    field: String,
    op: FilterOp,
    value: String,
    pattern: Option<Regex>,
}

impl FilterStage {
    pub fn build(spec: &StageSpec) -> Result<FilterStage, QueryError> {
        let (field, op, value) = if spec.args.len() >= 3 {
            let op = FilterOp::parse(&spec.args[1], "filter")?;
            (spec.args[0].clone(), op, spec.args[2].clone())
        } else if spec.args.is_empty() && spec.params.len() == 1 {
            // `filter level=ERROR` tokenizes as a parameter; treat as equality.
            let (key, value) = spec.params.iter().next().map(|(k, v)| (k.clone(), v.clone()))
                .ok_or_else(|| QueryError::MissingParameter {
                    stage: "filter".to_string(),
                    param: "field".to_string(),
                })?;
            (key, FilterOp::Eq, value)
        } else {
            return Err(QueryError::MissingParameter {
                stage: "filter".to_string(),
                param: "field operator value".to_string(),
            });
        };

        let pattern = match op {
            FilterOp::Regex | FilterOp::NotRegex => {
                Some(Regex::new(&value).map_err(|source| QueryError::InvalidPattern {
                    stage: "filter".to_string(),
                    pattern: value.clone(),
                    source,
                })?)
            }
            _ => None,
        };

        Ok(FilterStage {
            field,
            op,
            value,
            pattern,
        })
    }

    pub fn matches(&self, actual: &str) -> bool {
        match self.op {
            FilterOp::Eq => actual == self.value,
            FilterOp::Ne => actual != self.value,
            FilterOp::Gt => compare(actual, &self.value) == Ordering::Greater,
            FilterOp::Ge => compare(actual, &self.value) != Ordering::Less,
            FilterOp::Lt => compare(actual, &self.value) == Ordering::Less,
            FilterOp::Le => compare(actual, &self.value) != Ordering::Greater,
            FilterOp::Contains => actual.contains(&self.value),
            FilterOp::StartsWith => actual.starts_with(&self.value),
            FilterOp::EndsWith => actual.ends_with(&self.value),
            FilterOp::Regex => self.pattern.as_ref().is_some_and(|p| p.is_match(actual)),
            FilterOp::NotRegex => !self.pattern.as_ref().is_some_and(|p| p.is_match(actual)),
        }
    }

    pub fn apply(&self, input: PipeResult) -> PipeResult {
        match input {
            PipeResult::Logs(mut logs) => {
                logs.records.retain(|record| {
                    record
                        .fields
                        .get(&self.field)
                        .is_some_and(|value| self.matches(value))
                });
                PipeResult::Logs(logs)
            }
            PipeResult::Table(mut table) => {
                // source_hits keeps counting the original inputs.
                table.rows.retain(|row| {
                    row.get(&self.field)
                        .is_some_and(|cell| self.matches(&cell.to_string()))
                });
                PipeResult::Table(table)
            }
            other => other,
        }
    }
}

/// Numeric comparison when both sides parse, lexicographic otherwise.
fn compare(lhs: &str, rhs: &str) -> Ordering {
    match (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => lhs.cmp(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::query::parse;

    fn build(query: &str) -> FilterStage {
        let parsed = parse(query);
        FilterStage::build(&parsed.stages[0]).unwrap()
    }

    fn run(stage: &FilterStage, records: Vec<Record>) -> Vec<Record> {
        match stage.apply(PipeResult::logs(records)) {
            PipeResult::Logs(logs) => logs.records,
            other => panic!("expected logs, got {}", other.variant_name()),
        }
    }

    #[test]
    fn numeric_comparison_beats_lexicographic() {
        let stage = build("* | filter dur > 9");
        assert!(stage.matches("10"));
        assert!(!stage.matches("9"));

        // Non-numeric sides fall back to string ordering.
        let stage = build("* | filter name > bbb");
        assert!(stage.matches("ccc"));
        assert!(!stage.matches("aaa"));
    }

    #[test]
    fn missing_field_never_matches() {
        let stage = build("* | filter level = ERROR");
        let records = vec![
            Record::new("a").with_field("level", "ERROR"),
            Record::new("b"),
        ];
        let kept = run(&stage, records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].raw, "a");
    }

    #[test]
    fn param_form_means_equality() {
        let stage = build("* | filter level=ERROR");
        assert!(stage.matches("ERROR"));
        assert!(!stage.matches("WARN"));
    }

    #[test]
    fn substring_operators() {
        let stage = build("* | filter msg contains time");
        assert!(stage.matches("timeout waiting"));

        let stage = build("* | filter msg startswith time");
        assert!(stage.matches("timeout"));
        assert!(!stage.matches("a timeout"));

        let stage = build("* | filter msg endswith out");
        assert!(stage.matches("timeout"));
    }

    #[test]
    fn regex_operator_compiles_at_build() {
        let stage = build(r"* | filter msg regex t.me");
        assert!(stage.matches("time"));
        assert!(stage.matches("tame"));
        assert!(!stage.matches("tam"));

        let parsed = parse("* | filter msg regex [");
        let err = FilterStage::build(&parsed.stages[0]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPattern { .. }));
    }

    #[test]
    fn negated_regex() {
        let stage = build(r"* | filter msg notmatch ^debug");
        assert!(stage.matches("info: ok"));
        assert!(!stage.matches("debug: noisy"));
    }

    #[test]
    fn filter_is_idempotent() {
        let stage = build("* | filter level = ERROR");
        let records = vec![
            Record::new("a").with_field("level", "ERROR"),
            Record::new("b").with_field("level", "WARN"),
            Record::new("c").with_field("level", "ERROR"),
        ];
        let once = run(&stage, records);
        let twice = run(&stage, once.clone());
        assert_eq!(once.len(), twice.len());
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn missing_args_rejects_query() {
        let parsed = parse("* | filter");
        assert!(matches!(
            FilterStage::build(&parsed.stages[0]),
            Err(QueryError::MissingParameter { .. })
        ));
    }
}
