// src/stages/mod.rs - closed set of pipe stages + factory
pub mod chart;
pub mod export;
pub mod filter;
pub mod stats;
pub mod timechart;
pub mod transform;

pub use chart::ChartStage;
pub use export::ExportStage;
pub use filter::{FilterOp, FilterStage};
pub use stats::{AggFunc, AggSpec, StatsStage};
pub use timechart::TimeChartStage;
pub use transform::{TransformOp, TransformStage};

use crate::error::{PipelineError, QueryError};
use crate::model::PipeResult;
use crate::query::StageSpec;

/// One executable pipe stage. A closed enum rather than a trait hierarchy
/// so the terminal/non-terminal transition table stays exhaustively
/// checkable.
#[derive(Debug)]
pub enum Stage {
    Filter(FilterStage),
    Transform(TransformStage),
    Stats(StatsStage),
    Chart(ChartStage),
    TimeChart(TimeChartStage),
    Export(ExportStage),
}

impl Stage {
    /// Build a stage from its parsed spec. All argument validation happens
    /// here; a failure rejects the whole query before anything runs.
    pub fn build(spec: &StageSpec) -> Result<Stage, QueryError> {
        match spec.command.as_str() {
            "filter" => Ok(Stage::Filter(FilterStage::build(spec)?)),
            "transform" => Ok(Stage::Transform(TransformStage::build(spec)?)),
            "stats" => Ok(Stage::Stats(StatsStage::build(spec)?)),
            "chart" => Ok(Stage::Chart(ChartStage::build(spec)?)),
            "timechart" => Ok(Stage::TimeChart(TimeChartStage::build(spec)?)),
            "export" => Ok(Stage::Export(ExportStage::build(spec)?)),
            _ => Err(QueryError::UnknownCommand {
                command: spec.command.clone(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Filter(_) => "filter",
            Stage::Transform(_) => "transform",
            Stage::Stats(_) => "stats",
            Stage::Chart(_) => "chart",
            Stage::TimeChart(_) => "timechart",
            Stage::Export(_) => "export",
        }
    }

    /// Run the stage over the previous stage's output. Chart, timechart and
    /// export results are terminal: later stages pass them through
    /// unchanged with a warning instead of failing.
    pub fn execute(&self, input: PipeResult) -> Result<PipeResult, PipelineError> {
        if input.is_terminal() {
            tracing::warn!(
                stage = self.name(),
                input = input.variant_name(),
                "stage after terminal result is a no-op"
            );
            return Ok(input);
        }

        match (self, input) {
            (Stage::Filter(stage), input) => Ok(stage.apply(input)),
            (Stage::Transform(stage), input) => Ok(stage.apply(input)),
            (Stage::Stats(stage), PipeResult::Logs(logs)) => {
                Ok(PipeResult::Table(stage.execute(&logs.records)))
            }
            (Stage::Chart(stage), PipeResult::Logs(logs)) => {
                Ok(PipeResult::Chart(stage.execute(&logs.records)))
            }
            (Stage::TimeChart(stage), PipeResult::Logs(logs)) => {
                Ok(PipeResult::TimeChart(stage.execute(&logs.records)))
            }
            (Stage::Export(stage), PipeResult::Logs(logs)) => {
                Ok(PipeResult::Export(stage.execute(logs.records)))
            }
            (stage, input) => {
                // Aggregating stages only consume raw logs.
                tracing::warn!(
                    stage = stage.name(),
                    input = input.variant_name(),
                    "stage cannot consume this result, passing through"
                );
                Ok(input)
            }
        }
    }
}

/// Shared `stats`/`chart`/`timechart` convention: positional arguments are
/// aggregation expressions until the literal `by`; everything after it is
/// group-by field names.
pub(crate) fn split_on_by(args: &[String]) -> (Vec<String>, Vec<String>) {
    match args.iter().position(|a| a.eq_ignore_ascii_case("by")) {
        Some(i) => (args[..i].to_vec(), args[i + 1..].to_vec()),
        None => (args.to_vec(), Vec::new()),
    }
}

/// Parse aggregation expressions, defaulting to `count` when none given.
pub(crate) fn parse_aggregations(
    tokens: &[String],
    stage: &str,
) -> Result<Vec<AggSpec>, QueryError> {
    if tokens.is_empty() {
        return Ok(vec![AggSpec::count()]);
    }
    tokens.iter().map(|t| AggSpec::parse(t, stage)).collect()
}
