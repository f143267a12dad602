//! Outbound client commands.

use serde::Serialize;

use crate::config::AppConfig;

/// `response.create` options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseOptions {
    pub modalities: Vec<String>,
}

impl ResponseOptions {
    /// Text-only response, used for translations.
    pub fn text_only() -> Self {
        Self {
            modalities: vec!["text".into()],
        }
    }
}

/// Transcription model for the input audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Server VAD settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub silence_duration_ms: u32,
    pub prefix_padding_ms: u32,
}

/// The `session` object of `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: InputAudioTranscription,
    pub turn_detection: TurnDetection,
}

impl SessionUpdate {
    /// Session settings for a translating session.
    ///
    /// Input transcription is always enabled: the transcript is the task's
    /// source text.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            modalities: vec!["text".into(), "audio".into()],
            instructions: config.translation.instructions(),
            input_audio_format: "pcm16".into(),
            output_audio_format: "pcm16".into(),
            input_audio_transcription: InputAudioTranscription {
                model: "whisper-1".into(),
            },
            turn_detection: TurnDetection {
                kind: "server_vad".into(),
                threshold: config.vad.threshold,
                silence_duration_ms: config.vad.silence_duration_ms,
                prefix_padding_ms: config.vad.prefix_padding_ms,
            },
        }
    }
}

/// Every command this client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Base64-encoded PCM16 frame.
    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    CommitAudio,

    #[serde(rename = "input_audio_buffer.clear")]
    ClearAudio,

    #[serde(rename = "response.create")]
    CreateResponse { response: ResponseOptions },

    #[serde(rename = "response.cancel")]
    CancelResponse,

    #[serde(rename = "session.update")]
    UpdateSession { session: SessionUpdate },
}

impl ClientCommand {
    /// Wire name of the command.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::AppendAudio { .. } => "input_audio_buffer.append",
            ClientCommand::CommitAudio => "input_audio_buffer.commit",
            ClientCommand::ClearAudio => "input_audio_buffer.clear",
            ClientCommand::CreateResponse { .. } => "response.create",
            ClientCommand::CancelResponse => "response.cancel",
            ClientCommand::UpdateSession { .. } => "session.update",
        }
    }

    /// Serialise to the JSON text frame sent on the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
