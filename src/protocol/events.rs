//! Inbound server events.
//!
//! Payload structs carry only the fields the session engine reads; anything
//! else the server sends is ignored by serde.  Identifier fields are
//! `Option` because the server does not promise them on every event.

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// A single inbound message that could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON object has no string `type` discriminator.
    #[error("message has no `type` field")]
    MissingType,

    /// The type is known but its payload does not match.
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// A conversation item as announced by `conversation.item.created`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConversationItem {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub role: Option<String>,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// `true` for a user message, i.e. the start of an utterance's lifecycle.
    pub fn is_user_message(&self) -> bool {
        self.role.as_deref() == Some("user")
            && self.kind.as_deref().map_or(true, |k| k == "message")
    }

    /// First non-empty text or transcript carried inline by the item.
    pub fn inline_text(&self) -> Option<&str> {
        self.content
            .iter()
            .filter_map(|part| part.text.as_deref().or(part.transcript.as_deref()))
            .find(|t| !t.trim().is_empty())
    }
}

/// One content part of a [`ConversationItem`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub transcript: Option<String>,
}

/// The `response` object of `response.created` / `response.done`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseInfo {
    pub id: Option<String>,
    pub status: Option<String>,
}

/// The `error` object of an `error` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ErrorDetail {
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// Every inbound event type the session engine understands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {},

    #[serde(rename = "session.updated")]
    SessionUpdated {},

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.committed")]
    AudioCommitted {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "conversation.item.created")]
    ItemCreated { item: ConversationItem },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        item_id: Option<String>,
        transcript: String,
    },

    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        response_id: Option<String>,
    },

    #[serde(rename = "response.text.delta")]
    TextDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "response.text.done")]
    TextDone {
        #[serde(default)]
        response_id: Option<String>,
        text: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorDetail,
    },

    /// Any type string not listed above.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Wire name of the event, `"unknown"` for the catch-all.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionCreated {} => "session.created",
            ServerEvent::SessionUpdated {} => "session.updated",
            ServerEvent::SpeechStarted { .. } => "input_audio_buffer.speech_started",
            ServerEvent::SpeechStopped { .. } => "input_audio_buffer.speech_stopped",
            ServerEvent::AudioCommitted { .. } => "input_audio_buffer.committed",
            ServerEvent::ItemCreated { .. } => "conversation.item.created",
            ServerEvent::TranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            ServerEvent::ResponseCreated { .. } => "response.created",
            ServerEvent::OutputItemDone { .. } => "response.output_item.done",
            ServerEvent::TextDelta { .. } => "response.text.delta",
            ServerEvent::TextDone { .. } => "response.text.done",
            ServerEvent::ResponseDone { .. } => "response.done",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Unknown => "unknown",
        }
    }
}

/// Decode one inbound text frame.
///
/// Unknown event types are not an error: they decode to
/// [`ServerEvent::Unknown`] and their type string is logged at debug level.
pub fn decode_server_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?
        .to_owned();

    let event = ServerEvent::deserialize(value)
        .map_err(|source| ProtocolError::Payload {
            kind: kind.clone(),
            source,
        })?;

    if event == ServerEvent::Unknown {
        log::debug!("protocol: unhandled event type {kind}");
    }
    Ok(event)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
