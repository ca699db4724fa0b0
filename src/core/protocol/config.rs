//! Protocol-level constants and configuration types.

use serde::{Deserialize, Serialize};

/// Audio sample rate used on both directions of the duplex channel.
pub const REALTIME_SAMPLE_RATE: u32 = 24_000;

/// Model used for input audio transcription.
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

// =============================================================================
// Voices
// =============================================================================

/// Available voices for synthesized speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// Alloy voice (default)
    #[default]
    Alloy,
    /// Echo voice
    Echo,
    /// Shimmer voice
    Shimmer,
}

impl Voice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Shimmer => "shimmer",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "alloy" => Self::Alloy,
            "echo" => Self::Echo,
            "shimmer" => Self::Shimmer,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
