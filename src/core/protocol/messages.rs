//! WebSocket message types for the realtime speech service.
//!
//! All events are JSON-encoded and sent over the duplex channel.
//!
//! # Protocol Overview
//!
//! Client events (sent to the service):
//! - session.update - Configure the session before streaming
//! - input_audio_buffer.append - Append one frame of captured audio
//!
//! Server events (received from the service):
//! - session.created - Session acknowledged, streaming may begin
//! - input_audio_buffer.speech_started - User started speaking (barge-in)
//! - conversation.item.input_audio_transcription.completed - User transcript
//! - response.audio.delta - Synthesized audio chunk
//! - response.audio_transcript.delta - Assistant transcript chunk
//! - response.audio_transcript.done - Assistant transcript complete
//! - response.done - Response complete
//! - error - Error reported by the service
//!
//! Any other event type deserializes to [`ServerEvent::Unrecognized`] so the
//! event loop stays forward-compatible with protocol additions.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::Voice;

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration carried by the `session.update` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Turn detection configuration
    pub turn_detection: TurnDetection,

    /// Input audio transcription configuration
    pub input_audio_transcription: InputAudioTranscription,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Temperature for response generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD decides when a user turn starts and ends
    #[serde(rename = "server_vad")]
    ServerVad,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

impl Default for InputAudioTranscription {
    fn default() -> Self {
        Self {
            model: super::config::TRANSCRIPTION_MODEL.to_string(),
        }
    }
}

// =============================================================================
// Client Events (sent to the service)
// =============================================================================

/// Client events sent over the duplex channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append one frame of captured audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio data
        audio: String,
    },
}

impl ClientEvent {
    /// Create an audio append event from raw PCM16 bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server Events (received from the service)
// =============================================================================

/// Server events received over the duplex channel.
///
/// Struct variants tolerate extra fields, so payload additions by the service
/// do not break deserialization; unknown discriminants fall through to
/// [`ServerEvent::Unrecognized`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session created and acknowledged
    #[serde(rename = "session.created")]
    SessionCreated {},

    /// Speech detection started (user is talking)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},

    /// Input audio transcription completed for the current user turn
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Transcript of what the user said
        transcript: String,
    },

    /// Assistant transcript chunk
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Transcript delta
        delta: String,
    },

    /// Assistant transcript complete
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Full transcript as assembled by the service
        #[serde(default)]
        transcript: String,
    },

    /// Synthesized audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded PCM16 audio delta
        delta: String,
    },

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone {},

    /// Error reported by the service
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Any event type this client does not know about
    #[serde(other)]
    Unrecognized,
}

impl ServerEvent {
    /// Decode base64 audio from an `AudioDelta` payload.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

/// Error information reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error message
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_serialization() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                turn_detection: TurnDetection::ServerVad,
                input_audio_transcription: InputAudioTranscription::default(),
                instructions: Some("You are a friendly tutor.".to_string()),
                temperature: Some(0.8),
                voice: Some(Voice::Echo),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"session.update""#));
        assert!(json.contains(r#""turn_detection":{"type":"server_vad"}"#));
        assert!(json.contains(r#""input_audio_transcription":{"model":"whisper-1"}"#));
        assert!(json.contains(r#""voice":"echo""#));
    }

    #[test]
    fn test_session_update_optional_fields_omitted() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                turn_detection: TurnDetection::ServerVad,
                input_audio_transcription: InputAudioTranscription::default(),
                instructions: None,
                temperature: None,
                voice: None,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("instructions"));
        assert!(!json.contains("temperature"));
        assert!(!json.contains("voice"));
    }

    #[test]
    fn test_audio_append() {
        let data = vec![0u8, 1, 2, 3];
        let event = ClientEvent::audio_append(&data);
        match event {
            ClientEvent::InputAudioBufferAppend { audio } => {
                let decoded = BASE64_STANDARD.decode(&audio).unwrap();
                assert_eq!(decoded, data);
            }
            _ => panic!("Wrong event type"),
        }
        let json = serde_json::to_string(&ClientEvent::audio_append(&[1, 2])).unwrap();
        assert!(json.contains(r#""type":"input_audio_buffer.append""#));
    }

    #[test]
    fn test_server_event_deserialization() {
        let json = r#"{"type":"response.audio_transcript.delta","delta":"Hello"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::AudioTranscriptDelta { delta } => assert_eq!(delta, "Hello"),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_server_event_tolerates_extra_fields() {
        let json = r#"{
            "type": "input_audio_buffer.speech_started",
            "audio_start_ms": 1234,
            "item_id": "item_42"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ServerEvent::SpeechStarted {}));
    }

    #[test]
    fn test_unknown_event_type_is_unrecognized() {
        let json = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ServerEvent::Unrecognized));
    }

    #[test]
    fn test_transcription_completed() {
        let json = r#"{
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_7",
            "content_index": 0,
            "transcript": "What is LIBOR?"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::TranscriptionCompleted { transcript } => {
                assert_eq!(transcript, "What is LIBOR?");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_error_event() {
        let json = r#"{
            "type": "error",
            "error": {"type": "invalid_request_error", "message": "bad frame"}
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.error_type, "invalid_request_error");
                assert_eq!(error.message, "bad frame");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_audio_delta_decode() {
        let original = vec![0u8, 1, 2, 3, 4, 5];
        let encoded = BASE64_STANDARD.encode(&original);
        let decoded = ServerEvent::decode_audio_delta(&encoded).unwrap();
        assert_eq!(decoded, original);
    }
}
