//! Ошибки пайплайна

use std::path::PathBuf;

use thiserror::Error;

/// Ошибки, возвращаемые пайплайном обучения и трекером экспериментов.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("column not found: {0}")]
    MissingColumn(String),

    #[error("column {column:?}, row {row}: expected a number, found {value:?}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("label {label:?} was not seen when the encoder for {column:?} was fitted")]
    UnseenLabel { column: String, label: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("tracking backend unreachable at {uri}: {source}")]
    Connection {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("tracking server returned {status} for {endpoint}: {body}")]
    Server {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("tracking error: {0}")]
    Tracking(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
