use std::path::PathBuf;

/// Errors raised while grouping, scoring or filtering dsRNA candidates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid contig/orientation key: {0}")]
    InvalidKey(String),

    #[error("curated region conflict on {contig}:{orientation}: {message}")]
    CuratedOverlap {
        contig: String,
        orientation: String,
        message: String,
    },

    #[error("malformed inverted repeat: {0}")]
    MalformedStructure(String),

    #[error("unrolled range {start}-{end} is outside of a structure with length {length}")]
    Unrolled { start: i64, end: i64, length: i64 },

    #[error("interval {start}-{end} is outside of the scoring window {wstart}-{wend}")]
    Window {
        start: i64,
        end: i64,
        wstart: i64,
        wend: i64,
    },

    #[error("position {pos} is outside of the boundary span {first}-{last}")]
    Boundary { pos: i64, first: i64, last: i64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("signal track error: {0}")]
    Signal(String),

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("malformed record in {path}: {message}")]
    Record { path: PathBuf, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table parsing error: {0}")]
    Table(#[from] polars::prelude::PolarsError),
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<unknown>"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
