use serde::{Deserialize, Serialize};

/// Machine-readable error codes carried in error responses.
/// Shared by every domain crate so the control plane sees one vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ParseError,
    Unauthorized,
    UnknownCommand,
    InvalidPayload,
    NotFound,
    Conflict,
    Busy,
    IoError,
    ConfigError,
    ReloadFailed,
    RollbackFailed,
    AcmeFailed,
    ProbeFailed,
    Internal,
}

impl ErrorCode {
    /// Whether the failure was caused by the request rather than the host.
    ///
    /// The CLI uses this to pick its exit status (2 for caller mistakes,
    /// 1 for everything else).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ParseError
                | Self::Unauthorized
                | Self::UnknownCommand
                | Self::InvalidPayload
                | Self::NotFound
                | Self::Conflict
        )
    }
}
