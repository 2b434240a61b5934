//! WebSocket transport for the duplex session.
//!
//! One reader task maps socket frames to `SessionEvent`s; one writer task
//! drains the outbound channel. The controller never touches the socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::endpoint::{DuplexEndpoint, LiveSession, SessionEvent};
use crate::protocol::{ClientMessage, ServerMessage, SessionSetup};
use hudlink_foundation::SessionError;

const EVENT_QUEUE: usize = 256;
const OUTBOUND_QUEUE: usize = 256;

/// Production endpoint speaking JSON over a WebSocket.
pub struct WsEndpoint {
    url: String,
}

impl WsEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl DuplexEndpoint for WsEndpoint {
    async fn open(&self, setup: SessionSetup) -> Result<LiveSession, SessionError> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SessionError::TransportError(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = socket.split();

        // Configuration goes first on the wire, before any media.
        let setup_json = serde_json::to_string(&ClientMessage::Setup { setup })
            .map_err(|e| SessionError::TransportError(format!("setup encode: {e}")))?;
        sink.send(Message::Text(setup_json))
            .await
            .map_err(|e| SessionError::TransportError(format!("setup send: {e}")))?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_QUEUE);

        let _ = event_tx.try_send(SessionEvent::Opened);

        let writer_events = event_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!("Skipping unencodable outbound message: {}", err);
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(json)).await {
                    tracing::warn!("Outbound send failed: {}", err);
                    let _ = writer_events
                        .send(SessionEvent::Closed {
                            reason: format!("send failed: {err}"),
                        })
                        .await;
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if event_tx.send(SessionEvent::Message(message)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                // A malformed message is dropped; the
                                // session continues.
                                tracing::warn!("Dropping malformed inbound message: {}", err);
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by peer".to_string());
                        let _ = event_tx.send(SessionEvent::Closed { reason }).await;
                        break;
                    }
                    // Ping/pong is handled by tungstenite; binary frames are
                    // not part of this protocol.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = event_tx
                            .send(SessionEvent::Closed {
                                reason: format!("transport error: {err}"),
                            })
                            .await;
                        break;
                    }
                    None => {
                        let _ = event_tx
                            .send(SessionEvent::Closed {
                                reason: "stream ended".to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        tracing::info!("Duplex session opened to {}", self.url);
        Ok(LiveSession::new(outbound_tx, event_rx, vec![writer, reader]))
    }
}
