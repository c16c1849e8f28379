/// Client-visible "invalid query" conditions, raised while parsing a stage
/// spec or building a stage. The whole query is rejected; nothing runs.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unknown pipe command '{command}'")]
    UnknownCommand { command: String },

    #[error("invalid pattern '{pattern}' in stage '{stage}': {source}")]
    InvalidPattern {
        stage: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("stage '{stage}' is missing required parameter '{param}'")]
    MissingParameter { stage: String, param: String },

    #[error("stage '{stage}': invalid argument '{value}': {message}")]
    InvalidArgument {
        stage: String,
        value: String,
        message: String,
    },
}

/// Execution-time failure inside a stage. Aborts the remaining chain.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },
}

/// Failures talking to the underlying record sources. Kept separate from
/// query/pipeline errors so callers can tell "bad query" from "storage
/// unavailable".
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("source '{source_name}' unavailable: {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("document {doc_id} missing from source '{source_name}'")]
    MissingDocument { source_name: String, doc_id: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Export sink failures (CSV materialization etc.).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("invalid export target '{0}'")]
    InvalidTarget(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for a search request.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}
