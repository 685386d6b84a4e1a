use std::path::PathBuf;

use tern_common::error::ErrorCode;
use tern_reverter::ReverterError;

use crate::WebserverCode;

#[derive(Debug, thiserror::Error)]
pub enum WebserverError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("no virtual host named {0}")]
    VhostNotFound(String),

    #[error("{0} already exists and is not an SSL virtual host")]
    SslConfigExists(PathBuf),

    #[error("`{command}` failed: {output}")]
    Command { command: String, output: String },

    #[error("{0} is not installed or not enabled")]
    NotInstalled(WebserverCode),

    #[error(transparent)]
    Reverter(#[from] ReverterError),
}

impl From<&WebserverError> for ErrorCode {
    fn from(e: &WebserverError) -> Self {
        match e {
            WebserverError::Io { .. } => ErrorCode::IoError,
            WebserverError::Parse { .. } => ErrorCode::ConfigError,
            WebserverError::VhostNotFound(_) | WebserverError::NotInstalled(_) => {
                ErrorCode::NotFound
            }
            WebserverError::SslConfigExists(_) => ErrorCode::Conflict,
            WebserverError::Command { .. } => ErrorCode::ReloadFailed,
            WebserverError::Reverter(inner) => ErrorCode::from(inner),
        }
    }
}
