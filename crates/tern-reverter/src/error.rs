use std::path::PathBuf;

use tern_common::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum ReverterError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rollback failed on {path}: {source}")]
    Rollback {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is being modified by another operation")]
    Busy(PathBuf),
}

impl From<&ReverterError> for ErrorCode {
    fn from(e: &ReverterError) -> Self {
        match e {
            ReverterError::Io { .. } => ErrorCode::IoError,
            ReverterError::Rollback { .. } => ErrorCode::RollbackFailed,
            ReverterError::Busy(_) => ErrorCode::Busy,
        }
    }
}
