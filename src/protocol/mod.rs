//! Realtime wire protocol: inbound events and outbound commands.
//!
//! Every message on the socket is a JSON object discriminated by its `type`
//! field.  Inbound messages decode into [`ServerEvent`], a tagged enum whose
//! catch-all [`ServerEvent::Unknown`] arm keeps unrecognised types from ever
//! failing a decode.  Outbound messages are built as [`ClientCommand`]s.
//!
//! ```rust
//! use realtime_translator::protocol::{decode_server_event, ServerEvent};
//!
//! let event = decode_server_event(r#"{"type":"response.created","response":{"id":"r1"}}"#).unwrap();
//! assert!(matches!(event, ServerEvent::ResponseCreated { .. }));
//!
//! let event = decode_server_event(r#"{"type":"rate_limits.updated"}"#).unwrap();
//! assert_eq!(event, ServerEvent::Unknown);
//! ```

pub mod commands;
pub mod events;

pub use commands::{
    ClientCommand, InputAudioTranscription, ResponseOptions, SessionUpdate, TurnDetection,
};
pub use events::{
    decode_server_event, ContentPart, ConversationItem, ErrorDetail, ProtocolError,
    ResponseInfo, ServerEvent,
};
