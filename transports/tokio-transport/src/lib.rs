//! Tokio-based WebSocket signaling channel for peercall
//!
//! This crate provides a concrete implementation of the `SignalingConnector`
//! and `SignalingChannel` traits using tokio-tungstenite. Frames are JSON
//! text messages as defined in `peercall::signaling::frame`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use peercall::signaling::{
    ChannelEvent, OutboundEvent, SignalingChannel, SignalingConnector, decode_frame, encode_frame,
};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

pub const DEFAULT_URL: &str = "ws://localhost:8888/";
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// WebSocket signaling channel
pub struct WebSocketSignalingChannel {
    ws_sink: Mutex<Option<WsSink>>,
}

impl WebSocketSignalingChannel {
    fn new(sink: WsSink) -> Self {
        Self {
            ws_sink: Mutex::new(Some(sink)),
        }
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignalingChannel {
    async fn emit(&self, event: OutboundEvent) -> Result<(), anyhow::Error> {
        let text = encode_frame(&event)?;

        let mut sink_guard = self.ws_sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Socket is closed"))?;

        debug!("--> Sending signaling frame: {} bytes", text.len());
        sink.send(Message::text(text))
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket send error: {}", e))?;
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(mut sink) = self.ws_sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("Error closing websocket: {e}");
            }
        }
    }
}

/// Connector for WebSocket signaling channels
pub struct WebSocketSignalingConnector {
    url: String,
}

impl WebSocketSignalingConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for WebSocketSignalingConnector {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

#[async_trait]
impl SignalingConnector for WebSocketSignalingConnector {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn SignalingChannel>, mpsc::Receiver<ChannelEvent>), anyhow::Error> {
        info!("Dialing {}", self.url);
        let (client, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {}", e))?;

        let (sink, stream) = client.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Connected must be observed before anything the server sends.
        let _ = event_tx.send(ChannelEvent::Connected).await;
        tokio::task::spawn(read_pump(stream, event_tx));

        let channel: Arc<dyn SignalingChannel> = Arc::new(WebSocketSignalingChannel::new(sink));
        Ok((channel, event_rx))
    }
}

async fn read_pump(mut stream: WsStream, event_tx: mpsc::Sender<ChannelEvent>) {
    loop {
        let event = match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!("<-- Received signaling frame: {} bytes", text.len());
                match decode_frame(text.as_str()) {
                    Ok(Some(event)) => event,
                    Ok(None) => {
                        debug!("Skipping unhandled signaling event");
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to decode signaling frame: {e}");
                        continue;
                    }
                }
            }
            Some(Ok(Message::Close(_))) => {
                trace!("Received close frame");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("Error reading from websocket: {e}");
                let _ = event_tx.send(ChannelEvent::Error(e.to_string())).await;
                break;
            }
            None => {
                trace!("Websocket stream ended");
                break;
            }
        };

        if event_tx.send(event).await.is_err() {
            warn!("Event receiver dropped, closing read pump");
            return;
        }
    }

    let _ = event_tx.send(ChannelEvent::Closed).await;
}
