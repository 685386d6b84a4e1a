//! Control-plane request and response envelopes.
//!
//! Field names are PascalCase on the wire:
//! `{"Command":"certificates.upload","Token":"...","Data":{...}}` in,
//! `{"Status":"ok","Data":...}` or `{"Status":"error","Error":"...","Code":"..."}` out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tern_common::error::ErrorCode;

/// Module used when a command carries no `module.` prefix.
pub const DEFAULT_MODULE: &str = "main";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub data: Value,
}

impl Request {
    /// `(module, action)`. Only the first `.` separates them.
    pub fn route(&self) -> (&str, &str) {
        split_command(&self.command)
    }
}

pub fn split_command(command: &str) -> (&str, &str) {
    match command.split_once('.') {
        Some((module, action)) => (module, action),
        None => (DEFAULT_MODULE, command),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub status: Status,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            status: Status::Ok,
            data,
            error: None,
            code: None,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: Value::Null,
            error: Some(message.into()),
            code: Some(code),
        }
    }

    /// Serialized bytes for the wire. A payload that cannot be serialized
    /// is replaced by an error response describing the failure.
    pub fn to_bytes(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to marshal response");
                let fallback = Response::error(
                    ErrorCode::Internal,
                    format!("failed to marshal response: {e}"),
                );
                serde_json::to_vec(&fallback).unwrap_or_else(|_| {
                    br#"{"Status":"error","Data":null,"Error":"failed to marshal response"}"#
                        .to_vec()
                })
            }
        }
    }
}
