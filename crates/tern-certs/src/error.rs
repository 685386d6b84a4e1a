use std::path::PathBuf;

use tern_common::error::ErrorCode;
use tern_reverter::ReverterError;
use tern_webserver::WebserverError;

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("certificate bundle has no private key")]
    MissingKey,

    #[error("invalid certificate name: {0}")]
    InvalidName(String),

    #[error("certificate not found: {0}")]
    NotFound(String),

    #[error("{client} failed: {message}")]
    Acme { client: String, message: String },

    #[error("TLS probe of {target} failed: {message}")]
    Probe { target: String, message: String },

    #[error(transparent)]
    Webserver(#[from] WebserverError),

    #[error(transparent)]
    Reverter(#[from] ReverterError),
}

impl CertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<&CertError> for ErrorCode {
    fn from(e: &CertError) -> Self {
        match e {
            CertError::Io { .. } => ErrorCode::IoError,
            CertError::InvalidCertificate(_)
            | CertError::MissingKey
            | CertError::InvalidName(_) => ErrorCode::InvalidPayload,
            CertError::NotFound(_) => ErrorCode::NotFound,
            CertError::Acme { .. } => ErrorCode::AcmeFailed,
            CertError::Probe { .. } => ErrorCode::ProbeFailed,
            CertError::Webserver(inner) => ErrorCode::from(inner),
            CertError::Reverter(inner) => ErrorCode::from(inner),
        }
    }
}
