// src/output.rs - terminal rendering for the CLI
use crate::engine::SearchResponse;
use crate::model::{ChartResult, PipeResult, Record, Series, Table, TimeChartResult};
use std::io::{self, Write};

pub fn render(
    response: &SearchResponse,
    json: bool,
    out: &mut impl Write,
) -> io::Result<()> {
    if json {
        let text = serde_json::to_string_pretty(response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        return writeln!(out, "{}", text);
    }

    match &response.result {
        PipeResult::Logs(logs) => {
            for record in &logs.records {
                writeln!(out, "{}", logfmt_line(record))?;
            }
        }
        PipeResult::Table(table) => render_table(table, out)?,
        PipeResult::Chart(chart) => render_chart(chart, out)?,
        PipeResult::TimeChart(chart) => render_timechart(chart, out)?,
        PipeResult::Export(export) => {
            writeln!(
                out,
                "export '{}': {} of {} records packaged",
                export.target, export.exported_count, export.total_count
            )?;
        }
    }

    if !response.facets.is_empty() {
        writeln!(out)?;
        for (field, values) in &response.facets {
            let summary: Vec<String> = values
                .iter()
                .map(|(value, count)| format!("{}({})", value, count))
                .collect();
            writeln!(out, "facet {}: {}", field, summary.join(" "))?;
        }
    }
    Ok(())
}

/// `key=value` line with the timestamp first, quoting values that need it.
pub fn logfmt_line(record: &Record) -> String {
    let mut parts = Vec::new();
    if let Some(ts) = record.timestamp {
        parts.push(format!("ts={}", ts));
    }
    for (key, value) in &record.fields {
        parts.push(format!("{}={}", key, quote_value(value)));
    }
    if parts.is_empty() {
        return record.raw.clone();
    }
    parts.join(" ")
}

fn quote_value(value: &str) -> String {
    if value.contains([' ', '"', '=']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn render_table(table: &Table, out: &mut impl Write) -> io::Result<()> {
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            table
                .columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                .collect()
        })
        .collect();
    write_aligned(&table.columns, &rows, out)
}

fn render_chart(chart: &ChartResult, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "chart ({})", chart.chart_type)?;
    render_series("label", &chart.labels, &chart.series, out)
}

fn render_timechart(chart: &TimeChartResult, out: &mut impl Write) -> io::Result<()> {
    render_series("bucket", &chart.labels, &chart.series, out)
}

fn render_series(
    label_header: &str,
    labels: &[String],
    series: &[Series],
    out: &mut impl Write,
) -> io::Result<()> {
    let mut headers = vec![label_header.to_string()];
    headers.extend(series.iter().map(|s| s.name.clone()));

    let rows: Vec<Vec<String>> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let mut row = vec![label.clone()];
            for s in series {
                row.push(
                    s.values
                        .get(i)
                        .map(|v| trim_float(*v))
                        .unwrap_or_default(),
                );
            }
            row
        })
        .collect();
    write_aligned(&headers, &rows, out)
}

fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn write_aligned(
    headers: &[String],
    rows: &[Vec<String>],
    out: &mut impl Write,
) -> io::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let render_row = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    writeln!(out, "{}", render_row(headers))?;
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(out, "{}", separator.join("  "))?;
    for row in rows {
        writeln!(out, "{}", render_row(row))?;
    }
    Ok(())
}
