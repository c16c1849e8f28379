// src/stages/transform.rs - per-record field rewrites
use crate::error::QueryError;
use crate::model::{CellValue, PipeResult, Record, Table};
use crate::query::StageSpec;
use indexmap::IndexMap;
use regex::{NoExpand, Regex};

#[derive(Debug)]
pub enum TransformOp {
    Rename {
        old: String,
        new: String,
    },
    Extract {
        source: String,
        pattern: Regex,
        target: String,
    },
    Replace {
        field: String,
        pattern: Regex,
        replacement: String,
    },
    Merge {
        sources: Vec<String>,
        separator: String,
        target: String,
    },
    Eval {
        target: String,
        expression: String,
    },
    Remove {
        field: String,
    },
}

#[derive(Debug)]
pub struct TransformStage {
    op: TransformOp,
}

fn missing(param: &str) -> QueryError {
    QueryError::MissingParameter {
        stage: "transform".to_string(),
        param: param.to_string(),
    }
}

fn compile(pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(pattern).map_err(|source| QueryError::InvalidPattern {
        stage: "transform".to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

impl TransformStage {
    pub fn build(spec: &StageSpec) -> Result<TransformStage, QueryError> {
        let op_name = spec.args.first().ok_or_else(|| missing("operation"))?;
        // `as` and a lone `=` are connective keywords, not operands.
        let operands: Vec<&String> = spec.args[1..]
            .iter()
            .filter(|a| !a.eq_ignore_ascii_case("as") && a.as_str() != "=")
            .collect();

        let op = match op_name.to_lowercase().as_str() {
            "rename" => TransformOp::Rename {
                old: operands.first().ok_or_else(|| missing("old field"))?.to_string(),
                new: operands.get(1).ok_or_else(|| missing("new field"))?.to_string(),
            },
            "extract" => TransformOp::Extract {
                source: operands.first().ok_or_else(|| missing("source field"))?.to_string(),
                pattern: compile(operands.get(1).ok_or_else(|| missing("pattern"))?)?,
                target: operands.get(2).ok_or_else(|| missing("target field"))?.to_string(),
            },
            "replace" => TransformOp::Replace {
                field: operands.first().ok_or_else(|| missing("field"))?.to_string(),
                pattern: compile(operands.get(1).ok_or_else(|| missing("pattern"))?)?,
                replacement: operands.get(2).map(|s| s.to_string()).unwrap_or_default(),
            },
            "merge" => {
                if operands.len() < 2 {
                    return Err(missing("source fields and target"));
                }
                let target = operands[operands.len() - 1].to_string();
                let sources = operands[..operands.len() - 1]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                TransformOp::Merge {
                    sources,
                    separator: spec.params.get("sep").cloned().unwrap_or_default(),
                    target,
                }
            }
            "eval" => {
                if operands.len() < 2 {
                    return Err(missing("target and expression"));
                }
                let target = operands[0].to_string();
                let expression = operands[1..]
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                TransformOp::Eval { target, expression }
            }
            "remove" => TransformOp::Remove {
                field: operands.first().ok_or_else(|| missing("field"))?.to_string(),
            },
            other => {
                return Err(QueryError::InvalidArgument {
                    stage: "transform".to_string(),
                    value: other.to_string(),
                    message: "unknown transform operation".to_string(),
                })
            }
        };

        Ok(TransformStage { op })
    }

    pub fn apply(&self, input: PipeResult) -> PipeResult {
        match input {
            PipeResult::Logs(mut logs) => {
                for record in &mut logs.records {
                    self.apply_record(record);
                }
                PipeResult::Logs(logs)
            }
            PipeResult::Table(table) => PipeResult::Table(self.apply_table(table)),
            other => other,
        }
    }

    fn apply_record(&self, record: &mut Record) {
        match &self.op {
            TransformOp::Rename { old, new } => {
                if let Some(value) = record.fields.shift_remove(old) {
                    record.fields.insert(new.clone(), value);
                }
            }
            TransformOp::Extract {
                source,
                pattern,
                target,
            } => {
                let extracted = record
                    .fields
                    .get(source)
                    .and_then(|value| extract_match(pattern, value));
                if let Some(extracted) = extracted {
                    record.fields.insert(target.clone(), extracted);
                }
            }
            TransformOp::Replace {
                field,
                pattern,
                replacement,
            } => {
                if let Some(value) = record.fields.get_mut(field) {
                    *value = pattern.replace_all(value, NoExpand(replacement)).into_owned();
                }
            }
            TransformOp::Merge {
                sources,
                separator,
                target,
            } => {
                let merged = merge_fields(&record.fields, sources, separator);
                record.fields.insert(target.clone(), merged);
            }
            TransformOp::Eval { target, expression } => {
                let (text, _) = evaluate(expression, &record.fields);
                record.fields.insert(target.clone(), text);
            }
            TransformOp::Remove { field } => {
                record.fields.shift_remove(field);
            }
        }
    }

    fn apply_table(&self, mut table: Table) -> Table {
        match &self.op {
            TransformOp::Rename { old, new } => {
                for column in &mut table.columns {
                    if column == old {
                        *column = new.clone();
                    }
                }
                for row in &mut table.rows {
                    if let Some(value) = row.shift_remove(old) {
                        row.insert(new.clone(), value);
                    }
                }
            }
            TransformOp::Extract {
                source,
                pattern,
                target,
            } => {
                for row in &mut table.rows {
                    let extracted = row
                        .get(source)
                        .and_then(|cell| extract_match(pattern, &cell.to_string()));
                    if let Some(extracted) = extracted {
                        row.insert(target.clone(), CellValue::Str(extracted));
                    }
                }
                ensure_column(&mut table.columns, target);
            }
            TransformOp::Replace {
                field,
                pattern,
                replacement,
            } => {
                for row in &mut table.rows {
                    if let Some(cell) = row.get_mut(field) {
                        let replaced = pattern
                            .replace_all(&cell.to_string(), NoExpand(replacement))
                            .into_owned();
                        *cell = CellValue::Str(replaced);
                    }
                }
            }
            TransformOp::Merge {
                sources,
                separator,
                target,
            } => {
                for row in &mut table.rows {
                    let fields = stringify_row(row);
                    let merged = merge_fields(&fields, sources, separator);
                    row.insert(target.clone(), CellValue::Str(merged));
                }
                ensure_column(&mut table.columns, target);
            }
            TransformOp::Eval { target, expression } => {
                for row in &mut table.rows {
                    let fields = stringify_row(row);
                    let (text, number) = evaluate(expression, &fields);
                    let cell = match number {
                        Some(n) => CellValue::Num(n),
                        None => CellValue::Str(text),
                    };
                    row.insert(target.clone(), cell);
                }
                ensure_column(&mut table.columns, target);
            }
            TransformOp::Remove { field } => {
                table.columns.retain(|c| c != field);
                for row in &mut table.rows {
                    row.shift_remove(field);
                }
            }
        }
        table
    }
}

fn ensure_column(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|c| c == name) {
        columns.push(name.to_string());
    }
}

fn stringify_row(row: &IndexMap<String, CellValue>) -> IndexMap<String, String> {
    row.iter()
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect()
}

/// First capture group if the pattern has one, whole match otherwise.
fn extract_match(pattern: &Regex, value: &str) -> Option<String> {
    pattern.captures(value).map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    })
}

fn merge_fields(
    fields: &IndexMap<String, String>,
    sources: &[String],
    separator: &str,
) -> String {
    sources
        .iter()
        .filter_map(|name| fields.get(name).map(String::as_str))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Substitute every known field name occurring in the expression with its
/// value, then evaluate a single binary arithmetic operation if that is
/// what remains. The substitution is a blind substring replace: a field
/// name that is a substring of another field name or of a literal corrupts
/// the expression (kept from the source behavior).
fn evaluate(expression: &str, fields: &IndexMap<String, String>) -> (String, Option<f64>) {
    let mut text = expression.to_string();
    for (name, value) in fields {
        if text.contains(name.as_str()) {
            text = text.replace(name.as_str(), value);
        }
    }

    match eval_single_op(&text) {
        Some(n) => (CellValue::Num(n).to_string(), Some(n)),
        None => (text, None),
    }
}

fn eval_single_op(text: &str) -> Option<f64> {
    let operators: Vec<(usize, char)> = text
        .char_indices()
        .filter(|(_, c)| matches!(c, '+' | '-' | '*' | '/'))
        .collect();
    if operators.len() != 1 {
        return None;
    }

    let (index, op) = operators[0];
    let lhs: f64 = text[..index].trim().parse().ok()?;
    let rhs: f64 = text[index + op.len_utf8()..].trim().parse().ok()?;
    match op {
        '+' => Some(lhs + rhs),
        '-' => Some(lhs - rhs),
        '*' => Some(lhs * rhs),
        '/' => {
            if rhs == 0.0 {
                None
            } else {
                Some(lhs / rhs)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    fn build(query: &str) -> TransformStage {
        let parsed = parse(query);
        TransformStage::build(&parsed.stages[0]).unwrap()
    }

    fn run_one(stage: &TransformStage, record: Record) -> Record {
        match stage.apply(PipeResult::logs(vec![record])) {
            PipeResult::Logs(mut logs) => logs.records.remove(0),
            other => panic!("expected logs, got {}", other.variant_name()),
        }
    }

    #[test]
    fn rename_moves_value_and_drops_old_key() {
        let stage = build("* | transform rename user as username");
        let record = run_one(&stage, Record::new("x").with_field("user", "alice"));
        assert_eq!(record.fields.get("username").map(String::as_str), Some("alice"));
        assert!(!record.fields.contains_key("user"));
    }

    #[test]
    fn extract_takes_first_capture_group() {
        let stage = build(r"* | transform extract msg (\d+)ms as dur");
        let record = run_one(
            &stage,
            Record::new("x").with_field("msg", "request took 120ms"),
        );
        assert_eq!(record.fields.get("dur").map(String::as_str), Some("120"));
    }

    #[test]
    fn extract_without_group_takes_whole_match() {
        let stage = build(r"* | transform extract msg \d+ms as dur");
        let record = run_one(
            &stage,
            Record::new("x").with_field("msg", "request took 120ms"),
        );
        assert_eq!(record.fields.get("dur").map(String::as_str), Some("120ms"));
    }

    #[test]
    fn extract_no_match_is_noop() {
        let stage = build(r"* | transform extract msg (\d+)ms as dur");
        let record = run_one(&stage, Record::new("x").with_field("msg", "no numbers"));
        assert!(!record.fields.contains_key("dur"));
    }

    #[test]
    fn replace_overwrites_in_place() {
        let stage = build(r#"* | transform replace msg \d+ N"#);
        let record = run_one(
            &stage,
            Record::new("x").with_field("msg", "u 12 of 34"),
        );
        assert_eq!(record.fields.get("msg").map(String::as_str), Some("u N of N"));
    }

    #[test]
    fn merge_skips_absent_fields() {
        let stage = build("* | transform merge host port sep=: as addr");
        let record = run_one(&stage, Record::new("x").with_field("host", "db1"));
        assert_eq!(record.fields.get("addr").map(String::as_str), Some("db1"));

        let record = run_one(
            &stage,
            Record::new("x")
                .with_field("host", "db1")
                .with_field("port", "5432"),
        );
        assert_eq!(record.fields.get("addr").map(String::as_str), Some("db1:5432"));
    }

    #[test]
    fn eval_computes_single_binary_op() {
        let stage = build("* | transform eval total = a + b");
        let record = run_one(
            &stage,
            Record::new("x").with_field("a", "2").with_field("b", "3"),
        );
        assert_eq!(record.fields.get("total").map(String::as_str), Some("5"));
    }

    #[test]
    fn eval_falls_back_to_substituted_text() {
        let stage = build("* | transform eval note = x and y");
        let record = run_one(
            &stage,
            Record::new("r").with_field("x", "2").with_field("y", "3"),
        );
        assert_eq!(record.fields.get("note").map(String::as_str), Some("2 and 3"));
    }

    #[test]
    fn eval_substitution_is_a_blind_substring_replace() {
        // "a" is a substring of "abc"; the shorter name clobbers the longer
        // one. Known limitation of the substitution step.
        let stage = build("* | transform eval out = abc");
        let record = run_one(
            &stage,
            Record::new("r").with_field("a", "1").with_field("abc", "9"),
        );
        assert_eq!(record.fields.get("out").map(String::as_str), Some("1bc"));
    }

    #[test]
    fn remove_deletes_field() {
        let stage = build("* | transform remove secret");
        let record = run_one(
            &stage,
            Record::new("x")
                .with_field("secret", "hunter2")
                .with_field("user", "alice"),
        );
        assert!(!record.fields.contains_key("secret"));
        assert!(record.fields.contains_key("user"));
    }

    #[test]
    fn table_rename_updates_columns() {
        let stage = build("* | transform rename count as hits");
        let mut row = IndexMap::new();
        row.insert("user".to_string(), CellValue::Str("a".into()));
        row.insert("count".to_string(), CellValue::Num(3.0));
        let table = Table {
            columns: vec!["user".into(), "count".into()],
            rows: vec![row],
            source_hits: 3,
        };

        let result = stage.apply(PipeResult::Table(table));
        let PipeResult::Table(table) = result else {
            panic!("expected table");
        };
        assert_eq!(table.columns, vec!["user", "hits"]);
        assert_eq!(table.rows[0].get("hits"), Some(&CellValue::Num(3.0)));
    }

    #[test]
    fn bad_pattern_rejects_query() {
        let parsed = parse("* | transform extract msg [ as x");
        assert!(matches!(
            TransformStage::build(&parsed.stages[0]),
            Err(QueryError::InvalidPattern { .. })
        ));
    }
}
