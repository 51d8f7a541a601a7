use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("missing property '{0}'")]
    Missing(String),
    #[error("property '{key}' = '{value}' is not a valid {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("unable to read properties file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error("'{key}' must be at least {min}, got {value}")]
    TooSmall { key: &'static str, min: i64, value: i64 },
    #[error("range {min_key}..={max_key} is empty ({min} > {max})")]
    EmptyRange {
        min_key: &'static str,
        max_key: &'static str,
        min: i64,
        max: i64,
    },
    #[error("unknown responseType '{0}'")]
    UnknownResponseType(String),
}

/// Reasons a submitted response is rejected; the subject may retry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("Please select a duration")]
    MissingDuration,
    #[error("Please select an agreement level")]
    MissingAgreement,
    #[error("Please select a response")]
    MissingAnswer,
    #[error("Please select a confidence level")]
    MissingConfidence,
    #[error("'{0}' is not one of the answer labels")]
    UnknownAnswer(String),
    #[error("{field} {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("a rating response was submitted to an order-judgment experiment, or vice versa")]
    WrongKind,
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid response: {0}")]
    InvalidResponse(#[from] ResponseError),
    #[error("no block in the schedule has any trials")]
    EmptySchedule,
    #[error("playlist {path} line {line}: {reason}")]
    Playlist {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl ExperimentError {
    /// Recoverable errors leave the state untouched and the run may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidResponse(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
