//! TCP front end for the control plane.
//!
//! One task per connection. Each frame is one request; each request gets
//! exactly one response frame, errors included. Framing violations close
//! the connection after a final error response.

pub mod frame;
pub mod protocol;
pub mod router;

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use tern_common::error::ErrorCode;

use frame::{read_frame, write_frame, FrameError};
use protocol::{Request, Response};
use router::Router;

/// Connection-level settings shared by every connection.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub token: String,
    pub max_frame_bytes: usize,
}

/// Whether `presented` matches the configured token. An unset token
/// refuses everything.
pub fn authorize(expected: &str, presented: &str) -> bool {
    if expected.is_empty() || presented.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Accept connections until `cancel` fires.
pub async fn start(
    listener: TcpListener,
    router: Arc<Router>,
    settings: Arc<ServerSettings>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "Control-plane listener ready");
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let router = router.clone();
                let settings = settings.clone();
                tokio::spawn(async move {
                    tracing::debug!(%peer, "Connection opened");
                    if let Err(e) = handle_connection(stream, router, settings).await {
                        tracing::warn!(error = %e, %peer, "Control-plane connection error");
                    }
                });
            }
            _ = cancel.cancelled() => break,
        }
    }
    tracing::debug!("Control-plane listener stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    router: Arc<Router>,
    settings: Arc<ServerSettings>,
) -> Result<(), FrameError> {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let payload = match read_frame(&mut reader, settings.max_frame_bytes).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(e @ (FrameError::TooLarge { .. } | FrameError::Empty)) => {
                let response = Response::error(ErrorCode::ParseError, e.to_string());
                // The peer may already be gone; the framing error is what matters.
                let _ = write_frame(&mut writer, &response.to_bytes()).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let response = respond(&payload, &router, &settings).await;
        write_frame(&mut writer, &response.to_bytes()).await?;
    }
}

async fn respond(payload: &[u8], router: &Arc<Router>, settings: &ServerSettings) -> Response {
    let request: Request = match serde_json::from_slice(payload) {
        Ok(request) => request,
        Err(e) => return Response::error(ErrorCode::ParseError, format!("invalid request: {e}")),
    };

    if !authorize(&settings.token, &request.token) {
        tracing::warn!(command = %request.command, "Rejected request with invalid token");
        return Response::error(ErrorCode::Unauthorized, "invalid token");
    }

    let Request { command, data, .. } = request;
    let router = router.clone();
    let cmd = command.clone();
    let result = tokio::task::spawn_blocking(move || router.dispatch(&cmd, data)).await;

    match result {
        Ok(Ok(data)) => Response::ok(data),
        Ok(Err(e)) => {
            tracing::info!(command = %command, code = ?e.code, error = %e, "Command failed");
            Response::error(e.code, e.message)
        }
        Err(e) => {
            tracing::error!(command = %command, error = %e, "Handler panicked");
            Response::error(ErrorCode::Internal, format!("handler failed: {e}"))
        }
    }
}
