use anyhow::Context;
use clap::{ArgAction, Parser};
use is_terminal::IsTerminal;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use logsift::{
    memory::records_from_jsonl, CsvSink, EngineConfig, MemoryProvider, PipeResult, SearchEngine,
    SearchError, SearchRequest, Sink, SortSpec,
};

#[derive(Parser)]
#[command(name = "logsift")]
#[command(about = "Search structured logs with pipe queries")]
#[command(version)]
struct Args {
    /// Pipe query, e.g. "level:ERROR | stats count by user"
    #[arg(value_name = "QUERY")]
    query: String,

    /// Input JSONL file, loaded as one source (PATH or NAME=PATH)
    #[arg(short = 'i', long = "input", required = true, action = ArgAction::Append)]
    inputs: Vec<String>,

    /// Page number for stage-less queries (zero-based)
    #[arg(long, default_value = "0")]
    page: usize,

    /// Records per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Sort stage-less results by a field: FIELD or FIELD:desc (default: score)
    #[arg(long)]
    sort: Option<String>,

    /// Collect value counts for this field (repeatable)
    #[arg(long = "facet", action = ArgAction::Append)]
    facets: Vec<String>,

    /// Directory that export stages write CSV files into
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    /// Force JSON output even on a terminal
    #[arg(long)]
    json: bool,

    /// Debug mode - show stage-by-stage details
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.debug { "logsift=debug" } else { "logsift=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        let code = match e.downcast_ref::<SearchError>() {
            Some(SearchError::Retrieval(_)) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let provider = Arc::new(MemoryProvider::new());
    let mut sources = Vec::new();
    for input in &args.inputs {
        let (name, path) = source_spec(input);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read input file '{}'", path.display()))?;
        provider.add_source(&name, records_from_jsonl(&content, &name));
        sources.push(name);
    }

    let engine = SearchEngine::new(provider, EngineConfig::default());
    let request = SearchRequest {
        query: args.query.clone(),
        sources,
        time_range: None,
        page: args.page,
        page_size: args.page_size,
        sort: parse_sort(args.sort.as_deref()),
        facet_fields: args.facets.clone(),
    };

    let response = engine.run(&request)?;

    if let PipeResult::Export(export) = &response.result {
        let sink = CsvSink::new(&args.export_dir);
        let summary = sink.export(export)?;
        eprintln!(
            "wrote {} records to {}",
            summary.records_written,
            summary.destination.display()
        );
    }

    let stdout = io::stdout();
    let json = args.json || !stdout.is_terminal();
    logsift::output::render(&response, json, &mut stdout.lock())?;
    Ok(())
}

/// `NAME=PATH` names the source explicitly; a bare path uses the file stem.
fn source_spec(input: &str) -> (String, PathBuf) {
    if let Some((name, path)) = input.split_once('=') {
        if !name.is_empty() {
            return (name.to_string(), PathBuf::from(path));
        }
    }
    let path = PathBuf::from(input);
    let name = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string());
    (name, path)
}

fn parse_sort(sort: Option<&str>) -> SortSpec {
    match sort {
        None | Some("_score") => SortSpec::Score,
        Some(spec) => {
            let (name, descending) = match spec.split_once(':') {
                Some((name, "desc")) => (name, true),
                Some((name, _)) => (name, false),
                None => (spec, false),
            };
            SortSpec::Field {
                name: name.to_string(),
                descending,
            }
        }
    }
}
