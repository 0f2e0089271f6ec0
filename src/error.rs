use thiserror::Error;

/// Failures that stop a report run.
///
/// Dirty rows never end up here: a fact whose key is empty or does not
/// resolve is dropped by the loader and only counted.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("join references unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("{context} references unknown field '{field}'")]
    UnknownField { field: String, context: String },

    #[error("dimension '{dimension}' has duplicate key '{key}'")]
    DuplicateKey { dimension: String, key: String },

    #[error("dimension '{dimension}' has no key column '{column}'")]
    MissingKeyColumn { dimension: String, column: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
