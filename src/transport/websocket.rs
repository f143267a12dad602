//! WebSocket client for the realtime endpoint.
//!
//! [`RealtimeClient::connect`] performs the authenticated handshake, then
//! splits the socket between two background tasks:
//!
//! * **writer** drains an outbound channel of frames onto the socket;
//! * **reader** forwards inbound text frames to the [`Inbound`] receiver and
//!   drops its sender on close or error, which ends the inbound stream.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use super::{Transport, TransportError};
use crate::config::ApiConfig;
use crate::protocol::ClientCommand;

/// Outbound frames queued ahead of the socket.
const OUTBOUND_CAPACITY: usize = 256;
/// Inbound text frames buffered ahead of the receive loop.
const INBOUND_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Stream of inbound text frames.  `recv` returning `None` means the
/// connection is gone.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::Receiver<String>,
}

impl Inbound {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// A detached inbound stream fed through the returned sender.
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// RealtimeClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RealtimeClient {
    outbound: mpsc::Sender<Message>,
}

impl RealtimeClient {
    /// Open the WebSocket.
    ///
    /// # Errors
    ///
    /// [`TransportError::MissingApiKey`] when no key is configured,
    /// [`TransportError::ConnectTimeout`] when the handshake exceeds
    /// `connect_timeout_secs`, [`TransportError::Connect`] for any other
    /// handshake failure.
    pub async fn connect(config: &ApiConfig) -> Result<(Self, Inbound), TransportError> {
        let key = config
            .api_key
            .as_deref()
            .ok_or(TransportError::MissingApiKey)?;

        let url = config.realtime_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        log::info!("transport: connecting to {url}");
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let (socket, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| TransportError::ConnectTimeout(config.connect_timeout_secs))?
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        log::info!("transport: connected");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<String>(INBOUND_CAPACITY);

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = sink.send(frame).await {
                    log::warn!("transport: send failed: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            log::debug!("transport: writer stopped");
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(reason)) => {
                        log::info!("transport: server closed the connection ({reason:?})");
                        break;
                    }
                    Ok(Message::Binary(bytes)) => {
                        log::debug!("transport: ignoring {} byte binary frame", bytes.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::error!("transport: receive failed: {e}");
                        break;
                    }
                }
            }
            log::debug!("transport: reader stopped");
        });

        Ok((Self { outbound: out_tx }, Inbound::new(in_rx)))
    }

    /// Send a close frame.  Best effort: a closed connection is not an error.
    pub async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None)).await;
    }
}

#[async_trait]
impl Transport for RealtimeClient {
    async fn send(&self, command: ClientCommand) -> Result<(), TransportError> {
        let text = command.to_json()?;
        match &command {
            ClientCommand::AppendAudio { .. } => log::trace!("transport: → {}", command.kind()),
            _ => log::debug!("transport: → {}", command.kind()),
        }
        self.outbound
            .send(Message::Text(text))
            .await
            .map_err(|_| TransportError::Closed)
    }
}
