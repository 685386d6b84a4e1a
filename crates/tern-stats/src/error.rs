use std::path::PathBuf;

use tern_common::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("unknown statistics category: {0}")]
    UnknownCategory(String),
}

impl From<&StatsError> for ErrorCode {
    fn from(e: &StatsError) -> Self {
        match e {
            StatsError::Io { .. } => ErrorCode::IoError,
            StatsError::InvalidRecord(_) => ErrorCode::Internal,
            StatsError::UnknownCategory(_) => ErrorCode::InvalidPayload,
        }
    }
}
