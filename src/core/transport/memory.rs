//! In-memory duplex channel.
//!
//! Mirrors the WebSocket adapter's interface without a network: the test (or
//! embedding host) holds the [`MemoryChannelDriver`] and plays the service
//! side, feeding inbound events and inspecting the frames the client emits.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChannelError, EventChannel, OUTBOUND_CHANNEL_CAPACITY};
use crate::core::protocol::{ClientEvent, ServerEvent};

/// Client half of an in-memory duplex channel.
pub struct MemoryChannel {
    outbound_tx: mpsc::Sender<ClientEvent>,
    inbound_rx: mpsc::Receiver<ServerEvent>,
}

/// Service half of an in-memory duplex channel.
pub struct MemoryChannelDriver {
    /// Events the client sent (config frames, audio frames).
    pub outbound_rx: mpsc::Receiver<ClientEvent>,
    /// Feed for events the client will receive.
    pub inbound_tx: mpsc::Sender<ServerEvent>,
}

impl MemoryChannel {
    /// Create a connected channel/driver pair.
    pub fn pair() -> (Self, MemoryChannelDriver) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        (
            Self {
                outbound_tx,
                inbound_rx,
            },
            MemoryChannelDriver {
                outbound_rx,
                inbound_tx,
            },
        )
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    fn outbound(&self) -> mpsc::Sender<ClientEvent> {
        self.outbound_tx.clone()
    }

    async fn send(&self, event: ClientEvent) -> Result<(), ChannelError> {
        self.outbound_tx
            .send(event)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<ServerEvent>, ChannelError> {
        Ok(self.inbound_rx.recv().await)
    }

    async fn close(&mut self) {
        self.inbound_rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let (mut channel, mut driver) = MemoryChannel::pair();

        channel
            .send(ClientEvent::audio_append(&[1, 2, 3]))
            .await
            .unwrap();
        assert!(matches!(
            driver.outbound_rx.recv().await,
            Some(ClientEvent::InputAudioBufferAppend { .. })
        ));

        driver
            .inbound_tx
            .send(ServerEvent::SessionCreated {})
            .await
            .unwrap();
        assert!(matches!(
            channel.recv().await,
            Ok(Some(ServerEvent::SessionCreated {}))
        ));
    }

    #[tokio::test]
    async fn test_send_fails_after_driver_drop() {
        let (channel, driver) = MemoryChannel::pair();
        drop(driver);
        let result = channel.send(ClientEvent::audio_append(&[0])).await;
        assert!(matches!(result, Err(ChannelError::SendFailed(_))));
    }

    #[tokio::test]
    async fn test_recv_none_after_driver_drop() {
        let (mut channel, driver) = MemoryChannel::pair();
        drop(driver);
        assert!(matches!(channel.recv().await, Ok(None)));
    }
}
