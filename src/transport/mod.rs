//! Transport to the realtime service.
//!
//! ```text
//!   ┌────────────────────────┐   ClientCommand (JSON text)   ┌──────────┐
//!   │ Transport (trait)      │ ────────────────────────────▶ │  server  │
//!   │   RealtimeClient (ws)  │ ◀──────────────────────────── │          │
//!   └────────────────────────┘       Inbound (text frames)   └──────────┘
//! ```
//!
//! Outbound commands go through the [`Transport`] trait so the session logic
//! can be driven by `RecordingTransport` (available under `#[cfg(test)]`).
//! Inbound frames arrive on an [`Inbound`] receiver; when it yields `None`
//! the connection is gone.

pub mod websocket;

#[cfg(test)]
pub mod recording;

pub use websocket::{Inbound, RealtimeClient};

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{ClientCommand, ResponseOptions, SessionUpdate};

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    /// No API key was configured.
    #[error("no API key configured")]
    MissingApiKey,

    /// The request could not be built (bad URL or header value).
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),

    /// The WebSocket handshake failed.
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    /// The handshake did not finish within the configured timeout.
    #[error("WebSocket connection timed out after {0} s")]
    ConnectTimeout(u64),

    /// The connection is closed; nothing more can be sent.
    #[error("connection closed")]
    Closed,

    /// A command could not be serialised.
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Outbound half of the realtime connection.
///
/// Implementors must be `Send + Sync` so one handle can be shared by the
/// audio loop, the scheduler and the runner (`Arc<dyn Transport>`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, command: ClientCommand) -> Result<(), TransportError>;

    /// Append one base64 PCM16 frame to the remote input buffer.
    async fn send_audio(&self, audio: String) -> Result<(), TransportError> {
        self.send(ClientCommand::AppendAudio { audio }).await
    }

    /// Commit the remote input buffer and request a text-only response.
    async fn commit_and_respond(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::CommitAudio).await?;
        self.send(ClientCommand::CreateResponse {
            response: ResponseOptions::text_only(),
        })
        .await
    }

    async fn configure_session(&self, session: SessionUpdate) -> Result<(), TransportError> {
        self.send(ClientCommand::UpdateSession { session }).await
    }

    async fn clear_audio_buffer(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::ClearAudio).await
    }

    async fn cancel_response(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::CancelResponse).await
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingTransport;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn commit_and_respond_sends_two_commands_in_order() {
        let transport = RecordingTransport::new();
        transport.commit_and_respond().await.unwrap();
        assert_eq!(
            transport.sent(),
            vec![
                ClientCommand::CommitAudio,
                ClientCommand::CreateResponse {
                    response: ResponseOptions::text_only()
                }
            ]
        );
    }

    #[tokio::test]
    async fn commit_stops_at_first_failure() {
        let transport = RecordingTransport::closed();
        let err = transport.commit_and_respond().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn trait_object_helpers() {
        let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::new());
        transport.send_audio("AAAA".into()).await.unwrap();
        transport.clear_audio_buffer().await.unwrap();
        transport.cancel_response().await.unwrap();
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            TransportError::ConnectTimeout(10).to_string(),
            "WebSocket connection timed out after 10 s"
        );
        assert!(TransportError::Connect("refused".into())
            .to_string()
            .contains("refused"));
    }
}
