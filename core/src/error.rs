use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the clustering and search core and its adapters.
#[derive(Error, Debug)]
pub enum Error {
    #[error("max diameter must be a finite non-negative number, got {0}")]
    InvalidDiameter(f64),

    #[error("threshold for {what} must lie in [0, 1], got {value}")]
    InvalidThreshold { what: &'static str, value: f64 },

    #[error("n-gram size must be at least 1, got {0}")]
    InvalidNGram(usize),

    #[error("query id {0} is not part of the corpus")]
    UnknownQuery(u32),

    #[error("query id {0} was already clustered in this pass")]
    DuplicateQuery(u32),

    #[error("unknown score function '{0}'")]
    UnknownScore(String),

    #[error("unknown condition '{0}'")]
    UnknownCondition(String),

    #[error("unknown tokenizer '{0}'")]
    UnknownTokenizer(String),

    #[error("unknown ranker '{0}'")]
    UnknownRanker(String),

    #[error("index was built with tokenizer '{index}' but ranker uses '{ranker}'")]
    TokenizerMismatch { index: String, ranker: String },

    #[error("no index loaded for tokenizer '{0}'")]
    MissingIndex(String),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Stream(#[from] std::io::Error),

    #[error("failed to encode index data: {0}")]
    Encode(#[from] bincode::Error),

    #[error("failed to encode index metadata: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

pub(crate) fn check_unit(what: &'static str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidThreshold { what, value })
    }
}
