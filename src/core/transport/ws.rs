//! WebSocket transport adapter.
//!
//! Bridges the typed [`EventChannel`] interface onto a tokio-tungstenite
//! connection: a pump task serializes outbound events from an mpsc queue onto
//! the socket and parses inbound text frames into [`ServerEvent`]s. Malformed
//! frames are logged and dropped; the pump keeps running. A transport failure
//! is forwarded once to the receiver and ends the pump; reconnection is the
//! caller's decision, never automatic.
//!
//! Supports the OpenAI realtime endpoint (`Authorization: Bearer`) and Azure
//! OpenAI deployments (`api-key` header, deployment + api-version query
//! parameters).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use super::{ChannelError, EventChannel, OUTBOUND_CHANNEL_CAPACITY};
use crate::core::protocol::{ClientEvent, ServerEvent};

/// OpenAI realtime WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default Azure OpenAI realtime API version.
pub const AZURE_API_VERSION: &str = "2024-10-01-preview";

// =============================================================================
// Endpoints
// =============================================================================

/// Where to connect and how to authenticate.
#[derive(Debug, Clone)]
pub enum ServiceEndpoint {
    /// OpenAI realtime API, selected by model name.
    OpenAi {
        /// Model to use (e.g., "gpt-4o-realtime-preview")
        model: String,
    },
    /// Azure OpenAI resource, selected by deployment.
    Azure {
        /// Resource endpoint (e.g., "https://myresource.openai.azure.com")
        endpoint: String,
        /// Deployment name
        deployment: String,
        /// API version query parameter
        api_version: String,
    },
}

impl ServiceEndpoint {
    /// Build the WebSocket upgrade request for this endpoint.
    fn request(&self, api_key: &str) -> Result<http::Request<()>, ChannelError> {
        let (uri, host) = match self {
            Self::OpenAi { model } => (
                format!("{OPENAI_REALTIME_URL}?model={model}"),
                "api.openai.com".to_string(),
            ),
            Self::Azure {
                endpoint,
                deployment,
                api_version,
            } => {
                let parsed = Url::parse(endpoint)
                    .map_err(|e| ChannelError::ConnectFailed(format!("invalid endpoint: {e}")))?;
                let host = parsed
                    .host_str()
                    .ok_or_else(|| {
                        ChannelError::ConnectFailed("endpoint has no host".to_string())
                    })?
                    .to_string();
                (
                    format!(
                        "wss://{host}/openai/realtime?api-version={api_version}&deployment={deployment}"
                    ),
                    host,
                )
            }
        };

        let mut builder = http::Request::builder()
            .uri(&uri)
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);

        builder = match self {
            Self::OpenAi { .. } => builder
                .header("Authorization", format!("Bearer {api_key}"))
                .header("OpenAI-Beta", "realtime=v1"),
            Self::Azure { .. } => builder.header("api-key", api_key),
        };

        builder
            .body(())
            .map_err(|e| ChannelError::ConnectFailed(e.to_string()))
    }
}

// =============================================================================
// WebSocket channel
// =============================================================================

/// WebSocket-backed [`EventChannel`].
pub struct WsChannel {
    outbound_tx: mpsc::Sender<ClientEvent>,
    inbound_rx: mpsc::Receiver<Result<ServerEvent, ChannelError>>,
    pump: Option<JoinHandle<()>>,
}

impl WsChannel {
    /// Connect to the service and start the pump task.
    pub async fn connect(
        endpoint: &ServiceEndpoint,
        api_key: &str,
    ) -> Result<Self, ChannelError> {
        let request = endpoint.request(api_key)?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ChannelError::ConnectFailed(e.to_string()))?;
        tracing::info!("connected to realtime speech service");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<ClientEvent>(OUTBOUND_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) =
            mpsc::channel::<Result<ServerEvent, ChannelError>>(OUTBOUND_CHANNEL_CAPACITY);

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = outbound_rx.recv() => {
                        let Some(event) = outgoing else { break };
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("failed to serialize event: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("failed to send WebSocket message: {e}");
                            let _ = inbound_tx
                                .send(Err(ChannelError::SendFailed(e.to_string())))
                                .await;
                            break;
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if inbound_tx.send(Ok(event)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("dropping malformed server event: {e}");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                tracing::info!("WebSocket closed by server");
                                break;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("failed to send pong: {e}");
                                }
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {e}");
                                let _ = inbound_tx
                                    .send(Err(ChannelError::Transport(e.to_string())))
                                    .await;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            tracing::debug!("WebSocket pump ended");
        });

        Ok(Self {
            outbound_tx,
            inbound_rx,
            pump: Some(pump),
        })
    }
}

#[async_trait]
impl EventChannel for WsChannel {
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
        match self.inbound_rx.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.inbound_rx.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        tracing::info!("disconnected from realtime speech service");
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
