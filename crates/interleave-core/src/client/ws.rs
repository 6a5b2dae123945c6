//! WebSocket chat client.
//!
//! A reader task decodes server messages into [`WsEvent`]s on a channel;
//! the client keeps the write half for requests.

use anyhow::{Context, Result};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::GenerationOptions;
use crate::transport::frames::{ChatInput, ClientMessage, ServerFrame, decode_ws_message};
use crate::transport::reconnect::{ReconnectPolicy, connect_with_backoff};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const EVENT_BUFFER: usize = 256;

/// Something the server sent, or the connection ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Frame(ServerFrame),
    Disconnected,
    Error(String),
}

pub struct WsChatClient {
    sender: WsSink,
    events: mpsc::Receiver<WsEvent>,
}

impl WsChatClient {
    /// Opens one connection.
    ///
    /// # Errors
    /// Returns an error if the handshake fails.
    pub async fn connect(url: &Url) -> Result<Self> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;
        info!(url = %url, "websocket connected");

        let (sender, mut receiver) = stream.split();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            while let Some(message) = receiver.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => match decode_ws_message(text.as_str()) {
                        Ok(frame) => WsEvent::Frame(frame),
                        Err(e) => {
                            warn!(error = %e, "discarding malformed message");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "websocket read failed");
                        let _ = tx.send(WsEvent::Error(e.to_string())).await;
                        break;
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(WsEvent::Disconnected).await;
        });

        Ok(Self { sender, events })
    }

    /// Opens a connection, retrying per `policy`.
    ///
    /// # Errors
    /// Fails with the reconnect error once the policy is exhausted.
    pub async fn connect_with_backoff(url: &Url, policy: &mut ReconnectPolicy) -> Result<Self> {
        connect_with_backoff(policy, || Self::connect(url)).await
    }

    /// # Errors
    /// Returns an error if the socket is closed.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.sender
            .send(Message::Text(json.into()))
            .await
            .context("Failed to send websocket message")
    }

    /// # Errors
    /// Returns an error if the socket is closed.
    pub async fn send_chat(&mut self, message: ChatInput, options: GenerationOptions) -> Result<()> {
        self.send(&ClientMessage::ChatMessage { message, options })
            .await
    }

    /// # Errors
    /// Returns an error if the socket is closed.
    pub async fn request_tools(&mut self) -> Result<()> {
        self.send(&ClientMessage::GetTools).await
    }

    /// Next server event; `None` once the reader task has exited.
    pub async fn next_event(&mut self) -> Option<WsEvent> {
        self.events.recv().await
    }

    /// # Errors
    /// Returns an error if the close frame cannot be sent.
    pub async fn close(mut self) -> Result<()> {
        self.sender
            .send(Message::Close(None))
            .await
            .context("Failed to close websocket")
    }
}
