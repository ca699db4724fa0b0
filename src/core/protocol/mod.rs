//! Wire protocol for the realtime speech service.
//!
//! The service speaks a JSON event protocol over a duplex channel: the client
//! streams `input_audio_buffer.append` frames up and receives tagged events
//! (transcripts, synthesized audio, turn boundaries) back. This module models
//! that vocabulary with serde; the transport and session layers never touch
//! raw JSON.

mod config;
mod messages;

pub use config::{REALTIME_SAMPLE_RATE, TRANSCRIPTION_MODEL, Voice};
pub use messages::{
    ApiError, ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig, TurnDetection,
};
