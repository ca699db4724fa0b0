pub mod audio;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export commonly used types for convenience
pub use audio::{
    CaptureSource, CpalDeviceFactory, DeviceError, DeviceFactory, FRAME_SIZE, FrameChunker,
    PlaybackBuffer, RenderSink, list_input_devices, list_output_devices,
};

pub use protocol::{ClientEvent, REALTIME_SAMPLE_RATE, ServerEvent, Voice};

pub use session::{
    ResetLock, SessionController, SessionError, SessionHandle, SessionNotification,
    SessionSettings, SessionState, Turn,
};

pub use transport::{ChannelError, EventChannel, MemoryChannel, ServiceEndpoint, WsChannel};
