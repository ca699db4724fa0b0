//! Duplex channel abstraction over the realtime speech service.
//!
//! The session controller only ever talks to an [`EventChannel`]: typed client
//! events go out, typed server events come in, strictly in arrival order. The
//! production implementation is the WebSocket adapter in [`ws`]; the
//! [`memory`] implementation drives the controller in tests and embeddings
//! without a network.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::protocol::{ClientEvent, ServerEvent};

pub use memory::{MemoryChannel, MemoryChannelDriver};
pub use ws::{ServiceEndpoint, WsChannel};

/// Capacity of the outbound event queue. Sized for roughly a second of audio
/// frames plus control traffic.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the duplex channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Connection to the service failed
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Sending an event failed (channel closed or transport gone)
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The underlying transport reported an error while receiving
    #[error("transport error: {0}")]
    Transport(String),
}

// =============================================================================
// Channel trait
// =============================================================================

/// A bidirectional, ordered event stream to the speech service.
#[async_trait]
pub trait EventChannel: Send {
    /// Sender feeding the outbound queue; cloned into the capture chunker so
    /// audio frames bypass the controller.
    fn outbound(&self) -> mpsc::Sender<ClientEvent>;

    /// Send a single event, reporting failure if the channel is gone.
    async fn send(&self, event: ClientEvent) -> Result<(), ChannelError>;

    /// Receive the next inbound event.
    ///
    /// `Ok(None)` means the channel closed cleanly (by either side); `Err`
    /// surfaces a transport failure, after which no further events arrive.
    async fn recv(&mut self) -> Result<Option<ServerEvent>, ChannelError>;

    /// Close the channel. Idempotent.
    async fn close(&mut self);
}
