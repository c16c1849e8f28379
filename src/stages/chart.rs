// src/stages/chart.rs
use crate::error::QueryError;
use crate::model::{CellValue, ChartResult, Record, Series};
use crate::query::StageSpec;
use crate::stages::stats::StatsStage;

const DEFAULT_CHART_TYPE: &str = "bar";

/// Same aggregation machinery as `stats`, reshaped into labels and series.
/// The chart type is a rendering hint for some renderer outside this crate.
#[derive(Debug)]
pub struct ChartStage {
    stats: StatsStage,
    chart_type: String,
}

impl ChartStage {
    pub fn build(spec: &StageSpec) -> Result<ChartStage, QueryError> {
        let (agg_tokens, group_by) = super::split_on_by(&spec.args);
        let aggs = super::parse_aggregations(&agg_tokens, "chart")?;
        let chart_type = spec
            .params
            .get("type")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHART_TYPE.to_string());
        Ok(ChartStage {
            stats: StatsStage { aggs, group_by },
            chart_type,
        })
    }

    pub fn execute(&self, records: &[Record]) -> ChartResult {
        let table = self.stats.execute(records);

        // Labels come from the first group-by column, or the table's first
        // column when no group-by was given.
        let label_column = table.columns.first().cloned().unwrap_or_default();
        let labels: Vec<String> = table
            .rows
            .iter()
            .map(|row| {
                row.get(&label_column)
                    .map(|cell| cell.to_string())
                    .unwrap_or_default()
            })
            .collect();

        let series = self
            .stats
            .aggs
            .iter()
            .map(|agg| {
                let label = agg.label();
                let values = table
                    .rows
                    .iter()
                    .map(|row| {
                        row.get(&label)
                            .and_then(CellValue::as_number)
                            .unwrap_or(0.0)
                    })
                    .collect();
                Series {
                    name: label,
                    values,
                }
            })
            .collect();

        ChartResult {
            labels,
            series,
            chart_type: self.chart_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    fn build(query: &str) -> ChartStage {
        let parsed = parse(query);
        ChartStage::build(&parsed.stages[0]).unwrap()
    }

    fn record(user: &str, dur: &str) -> Record {
        Record::new("").with_field("user", user).with_field("dur", dur)
    }

    #[test]
    fn labels_follow_group_rows() {
        let stage = build("* | chart count by user");
        let records = vec![record("a", "1"), record("b", "2"), record("a", "3")];
        let chart = stage.execute(&records);

        assert_eq!(chart.labels, vec!["a", "b"]);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].name, "count");
        assert_eq!(chart.series[0].values, vec![2.0, 1.0]);
        assert_eq!(chart.chart_type, "bar");
    }

    #[test]
    fn one_series_per_aggregation() {
        let stage = build("* | chart count avg(dur) by user type=line");
        let records = vec![record("a", "10ms"), record("a", "30ms"), record("b", "5ms")];
        let chart = stage.execute(&records);

        assert_eq!(chart.chart_type, "line");
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.series[0].name, "count");
        assert_eq!(chart.series[1].name, "avg(dur)");
        assert_eq!(chart.series[0].values, vec![2.0, 1.0]);
        assert_eq!(chart.series[1].values, vec![20.0, 5.0]);
    }

    #[test]
    fn ungrouped_chart_uses_first_column() {
        let stage = build("* | chart count");
        let chart = stage.execute(&[record("a", "1"), record("b", "2")]);
        assert_eq!(chart.labels, vec!["2"]);
        assert_eq!(chart.series[0].values, vec![2.0]);
    }
}
