//! Capture-side chunking of raw microphone bytes into protocol frames.
//!
//! The capture device delivers PCM16 bytes in whatever sizes its callback
//! happens to produce; the service expects `input_audio_buffer.append` frames
//! of exactly [`FRAME_SIZE`] bytes. The chunker carries the remainder between
//! callbacks so no byte is ever dropped or reordered while capture is active.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::core::protocol::ClientEvent;

/// Raw payload size of one outbound audio frame: 2400 PCM16 samples.
pub const FRAME_SIZE: usize = 4800;

/// Accumulates raw capture bytes and emits full-size audio frames.
///
/// Lives inside the capture callback; `ingest` runs on the device thread and
/// must not block, so frames are handed to the transport with `try_send` and
/// dropped with a warning if the outbound queue is full.
pub struct FrameChunker {
    carry: Vec<u8>,
    active: Arc<AtomicBool>,
    outbound: mpsc::Sender<ClientEvent>,
}

impl FrameChunker {
    /// Create a chunker feeding `outbound`.
    ///
    /// `active` gates emission: while false (e.g., mid-reset) complete frames
    /// are discarded instead of sent, but the carry-over buffer is still
    /// trimmed so it never grows past one frame.
    pub fn new(active: Arc<AtomicBool>, outbound: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            carry: Vec::with_capacity(FRAME_SIZE * 2),
            active,
            outbound,
        }
    }

    /// Ingest a chunk of raw PCM16 bytes from the capture device.
    ///
    /// Emits one frame per complete [`FRAME_SIZE`] slice; the remainder stays
    /// buffered for the next call. A trailing partial frame at stream end is
    /// dropped, never padded.
    pub fn ingest(&mut self, raw: &[u8]) {
        self.carry.extend_from_slice(raw);
        while self.carry.len() >= FRAME_SIZE {
            let frame: Vec<u8> = self.carry.drain(..FRAME_SIZE).collect();
            if !self.active.load(Ordering::SeqCst) {
                continue;
            }
            let event = ClientEvent::audio_append(&frame);
            if self.outbound.try_send(event).is_err() {
                tracing::warn!("outbound frame queue full, dropping audio frame");
            }
        }
    }

    /// Bytes currently carried over, always < [`FRAME_SIZE`].
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }
}
