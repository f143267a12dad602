//! Test transport that records every command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Transport, TransportError};
use crate::protocol::ClientCommand;

#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<ClientCommand>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails with [`TransportError::Closed`].
    pub fn closed() -> Self {
        let transport = Self::default();
        transport.close();
        transport
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ClientCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Commands other than audio appends.
    pub fn control(&self) -> Vec<ClientCommand> {
        self.sent()
            .into_iter()
            .filter(|c| !matches!(c, ClientCommand::AppendAudio { .. }))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, command: ClientCommand) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(command);
        Ok(())
    }
}
