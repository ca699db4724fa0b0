//! Audio device adapters.
//!
//! The session core only sees two narrow seams: a push-style capture source
//! that hands raw PCM16 bytes to a callback, and a pull-style render sink that
//! drains the [`PlaybackBuffer`] once per render quantum. The `cpal`-backed
//! implementations below own their streams on dedicated threads, because cpal
//! streams are not `Send` and must live on the thread that created them.
//!
//! Capture is converted to the wire format here (mono, 24 kHz, PCM16 LE) so
//! the chunker and everything above it never see device-specific formats.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use thiserror::Error;

use super::playback::PlaybackBuffer;
use crate::core::protocol::REALTIME_SAMPLE_RATE;

/// Largest render quantum we pre-allocate for; anything beyond is padded with
/// silence rather than allocating on the render thread.
const MAX_QUANTUM_FRAMES: usize = 16_384;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while opening or driving audio devices.
///
/// A denied microphone permission surfaces from the platform as a build or
/// start failure on the input stream.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No input device available
    #[error("no input device available")]
    NoInputDevice,

    /// No output device available
    #[error("no output device available")]
    NoOutputDevice,

    /// Named device was not found
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to query device configuration
    #[error("failed to query device config: {0}")]
    DeviceConfig(String),

    /// Failed to build an audio stream
    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),

    /// Failed to start an audio stream
    #[error("failed to start audio stream: {0}")]
    StreamStart(String),

    /// The device thread died before reporting readiness
    #[error("audio device thread terminated unexpectedly")]
    ThreadFailed,
}

// =============================================================================
// Seams
// =============================================================================

/// Callback receiving raw capture bytes (PCM16 LE, 24 kHz, mono).
pub type CaptureCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Push-style microphone source.
pub trait CaptureSource: Send + Sync {
    /// Begin capturing; `on_data` is invoked from the device context whenever
    /// new audio is available.
    fn start(&mut self, on_data: CaptureCallback) -> Result<(), DeviceError>;

    /// Stop capturing and release the device.
    fn stop(&mut self);
}

/// Pull-style speaker sink.
pub trait RenderSink: Send + Sync {
    /// Begin rendering; the sink pulls blocks from `buffer` once per quantum.
    fn start(&mut self, buffer: PlaybackBuffer) -> Result<(), DeviceError>;

    /// Stop rendering and release the device.
    fn stop(&mut self);
}

/// Constructs fresh device handles for the reset sequence.
pub trait DeviceFactory: Send + Sync {
    /// Create a new capture source.
    fn create_capture(&self) -> Result<Box<dyn CaptureSource>, DeviceError>;

    /// Create a new render sink.
    fn create_render(&self) -> Result<Box<dyn RenderSink>, DeviceError>;
}

// =============================================================================
// Device enumeration
// =============================================================================

/// List available input device names.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.input_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// List available output device names.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.output_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

// =============================================================================
// Sample conversion helpers
// =============================================================================

/// Simple linear resampler between sample rates, mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Convert normalized f32 samples to PCM16 little-endian bytes.
fn f32_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32767.0) as i16;
        bytes.extend_from_slice(&pcm.to_le_bytes());
    }
    bytes
}

// =============================================================================
// cpal capture
// =============================================================================

enum DeviceCommand {
    Stop,
}

/// Microphone capture via cpal.
///
/// Opens the default (or named) input device at its native rate, down-mixes to
/// mono, resamples to 24 kHz, converts to PCM16 LE, and hands the bytes to the
/// registered callback. The cpal stream lives on a dedicated thread.
pub struct CpalCapture {
    device_name: Option<String>,
    control: Option<std_mpsc::Sender<DeviceCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Create a capture handle for the named device, or the default input.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            control: None,
            thread: None,
        }
    }

    fn build_stream(
        device_name: Option<&str>,
        mut on_data: CaptureCallback,
    ) -> Result<cpal::Stream, DeviceError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| DeviceError::DeviceConfig(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string()))?,
            None => host.default_input_device().ok_or(DeviceError::NoInputDevice)?,
        };

        let default_config = device
            .default_input_config()
            .map_err(|e| DeviceError::DeviceConfig(e.to_string()))?;
        let native_rate = default_config.sample_rate().0;
        let channels = default_config.channels();
        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(native_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            native_rate,
            channels,
            "input device selected (converting to {} Hz mono PCM16)",
            REALTIME_SAMPLE_RATE,
        );

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = to_mono(data, channels);
                    let resampled = resample_linear(&mono, native_rate, REALTIME_SAMPLE_RATE);
                    let bytes = f32_to_pcm16_bytes(&resampled);
                    on_data(&bytes);
                },
                |err| {
                    tracing::error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| DeviceError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| DeviceError::StreamStart(e.to_string()))?;
        Ok(stream)
    }
}

impl CaptureSource for CpalCapture {
    fn start(&mut self, on_data: CaptureCallback) -> Result<(), DeviceError> {
        if self.thread.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), DeviceError>>();
        let (control_tx, control_rx) = std_mpsc::channel::<DeviceCommand>();
        let device_name = self.device_name.clone();

        let thread = std::thread::spawn(move || {
            match Self::build_stream(device_name.as_deref(), on_data) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Hold the stream alive until stop (or handle drop).
                    let _ = control_rx.recv();
                    drop(stream);
                    tracing::debug!("audio capture stopped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.control = Some(control_tx);
                self.thread = Some(thread);
                tracing::info!("audio capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(DeviceError::ThreadFailed),
        }
    }

    fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(DeviceCommand::Stop);
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// cpal render
// =============================================================================

/// Speaker output via cpal.
///
/// Opens the default (or named) output device at 24 kHz and fills each render
/// quantum from the [`PlaybackBuffer`], duplicating the mono signal across the
/// device's channels. The callback pre-allocates its scratch block; the render
/// path itself never allocates and never blocks.
pub struct CpalRender {
    device_name: Option<String>,
    control: Option<std_mpsc::Sender<DeviceCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalRender {
    /// Create a render handle for the named device, or the default output.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            control: None,
            thread: None,
        }
    }

    fn build_stream(
        device_name: Option<&str>,
        buffer: PlaybackBuffer,
    ) -> Result<cpal::Stream, DeviceError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| DeviceError::DeviceConfig(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_output_device()
                .ok_or(DeviceError::NoOutputDevice)?,
        };

        let supported = device
            .supported_output_configs()
            .map_err(|e| DeviceError::DeviceConfig(e.to_string()))?
            .find(|c| {
                c.min_sample_rate() <= SampleRate(REALTIME_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(REALTIME_SAMPLE_RATE)
            })
            .ok_or_else(|| {
                DeviceError::DeviceConfig(format!(
                    "no output config supporting {REALTIME_SAMPLE_RATE} Hz"
                ))
            })?;
        let config = supported
            .with_sample_rate(SampleRate(REALTIME_SAMPLE_RATE))
            .config();
        let channels = config.channels as usize;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = REALTIME_SAMPLE_RATE,
            channels,
            "output device selected",
        );

        let mut scratch = vec![0.0f32; MAX_QUANTUM_FRAMES];
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = (data.len() / channels).min(scratch.len());
                    buffer.pull_block(&mut scratch[..frames]);
                    for (i, frame) in data.chunks_mut(channels).enumerate() {
                        let sample = if i < frames { scratch[i] } else { 0.0 };
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| DeviceError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| DeviceError::StreamStart(e.to_string()))?;
        Ok(stream)
    }
}

impl RenderSink for CpalRender {
    fn start(&mut self, buffer: PlaybackBuffer) -> Result<(), DeviceError> {
        if self.thread.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), DeviceError>>();
        let (control_tx, control_rx) = std_mpsc::channel::<DeviceCommand>();
        let device_name = self.device_name.clone();

        let thread = std::thread::spawn(move || {
            match Self::build_stream(device_name.as_deref(), buffer) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = control_rx.recv();
                    drop(stream);
                    tracing::debug!("audio playback stopped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.control = Some(control_tx);
                self.thread = Some(thread);
                tracing::info!("audio playback started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(DeviceError::ThreadFailed),
        }
    }

    fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(DeviceCommand::Stop);
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalRender {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// cpal factory
// =============================================================================

/// Default factory producing cpal-backed capture and render handles.
pub struct CpalDeviceFactory {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalDeviceFactory {
    /// Create a factory, optionally pinning device names.
    pub fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }
}

impl DeviceFactory for CpalDeviceFactory {
    fn create_capture(&self) -> Result<Box<dyn CaptureSource>, DeviceError> {
        Ok(Box::new(CpalCapture::new(self.input_device.clone())))
    }

    fn create_render(&self) -> Result<Box<dyn RenderSink>, DeviceError> {
        Ok(Box::new(CpalRender::new(self.output_device.clone())))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 24_000, 24_000), input);
    }

    #[test]
    fn test_resample_halves_length() {
        let input: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        let output = resample_linear(&input, 48_000, 24_000);
        assert_eq!(output.len(), 240);
        // Linear interpolation preserves monotonicity of a ramp.
        for pair in output.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5]);
        assert_eq!(to_mono(&stereo, 1), stereo);
    }

    #[test]
    fn test_f32_to_pcm16_clamps_and_encodes_le() {
        let bytes = f32_to_pcm16_bytes(&[1.5, -1.5, 0.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -32767);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }
}
