//! Audio pipeline building blocks.
//!
//! Capture side: a [`FrameChunker`] slices the raw byte stream from the
//! microphone into fixed-size protocol frames. Playback side: a
//! [`PlaybackBuffer`] queues decoded PCM16 samples for the realtime render
//! callback. Device access goes through the narrow [`CaptureSource`] /
//! [`RenderSink`] seams so the session layer never handles `cpal` types.

mod chunker;
mod device;
mod playback;

pub use chunker::{FRAME_SIZE, FrameChunker};
pub use device::{
    CaptureCallback, CaptureSource, CpalCapture, CpalDeviceFactory, CpalRender, DeviceError,
    DeviceFactory, RenderSink, list_input_devices, list_output_devices,
};
pub use playback::PlaybackBuffer;

/// Decode PCM16 little-endian bytes into samples.
///
/// A trailing odd byte is dropped; the service only ever sends whole samples.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
