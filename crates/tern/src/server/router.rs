//! Command routing: `module.action` to a handler.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use tern_certs::CertError;
use tern_common::error::ErrorCode;
use tern_stats::StatsError;
use tern_webserver::WebserverError;

use super::protocol::split_command;

/// A handler failure as the control plane sees it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPayload, message)
    }

    pub fn unknown_action(module: &str, action: &str) -> Self {
        Self::new(
            ErrorCode::UnknownCommand,
            format!("unknown command: {module}.{action}"),
        )
    }
}

impl From<CertError> for HandlerError {
    fn from(e: CertError) -> Self {
        Self::new(ErrorCode::from(&e), e.to_string())
    }
}

impl From<WebserverError> for HandlerError {
    fn from(e: WebserverError) -> Self {
        Self::new(ErrorCode::from(&e), e.to_string())
    }
}

impl From<StatsError> for HandlerError {
    fn from(e: StatsError) -> Self {
        Self::new(ErrorCode::from(&e), e.to_string())
    }
}

pub type HandlerResult = Result<Value, HandlerError>;

/// Decode a request's `Data` into the action's parameter type.
pub fn params<T: DeserializeOwned>(data: Value) -> Result<T, HandlerError> {
    serde_json::from_value(data).map_err(|e| HandlerError::invalid(format!("invalid data: {e}")))
}

/// Encode a handler's result.
pub fn reply<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| {
        HandlerError::new(ErrorCode::Internal, format!("failed to marshal response: {e}"))
    })
}

/// A group of actions under one command prefix.
///
/// Handlers are synchronous; the server runs them on the blocking pool.
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;
    fn handle(&self, action: &str, data: Value) -> HandlerResult;
}

#[derive(Default, Clone)]
pub struct Router {
    modules: HashMap<&'static str, Arc<dyn Module>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module: impl Module + 'static) -> Self {
        self.modules.insert(module.name(), Arc::new(module));
        self
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().copied()
    }

    pub fn dispatch(&self, command: &str, data: Value) -> HandlerResult {
        let (module, action) = split_command(command);
        let handler = self.modules.get(module).ok_or_else(|| {
            HandlerError::new(ErrorCode::UnknownCommand, format!("unknown module: {module}"))
        })?;
        tracing::debug!(module, action, "Dispatching");
        handler.handle(action, data)
    }
}
