//! `GET /ws`: chat over a WebSocket.
//!
//! A reader task parses incoming messages and queues them; this task is the
//! only writer and handles one request at a time, so frames of different
//! turns never interleave. Closing the socket cancels the running turn.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use interleave_core::config::GenerationOptions;
use interleave_core::core::TurnError;
use interleave_core::transport::frames::{INVALID_MESSAGE_FORMAT, MESSAGE_REQUIRED};
use interleave_core::transport::{ChatInput, ClientMessage, ServerFrame, ToolInfo};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::AppState;

type WsSink = SplitSink<WebSocket, Message>;

const INBOX_CAPACITY: usize = 32;

/// A parsed client message.
#[derive(Debug)]
enum Inbound {
    Chat {
        message: ChatInput,
        options: GenerationOptions,
    },
    GetTools,
    MessageRequired,
    Invalid,
    /// Valid JSON with an unrecognized `type`.
    Ignored,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("websocket client connected");
    let (mut sender, mut receiver) = socket.split();
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<Inbound>(INBOX_CAPACITY);

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if tx.send(parse_client_message(text.as_str())).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
            }
        }
        reader_cancel.cancel();
    });

    while let Some(inbound) = rx.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        let delivered = match inbound {
            Inbound::Chat { message, options } => {
                run_turn(&mut sender, &state, message, &options, &cancel).await
            }
            Inbound::GetTools => {
                let tools = state
                    .agent()
                    .registry()
                    .definitions()
                    .iter()
                    .map(ToolInfo::from)
                    .collect();
                send_frame(&mut sender, &ServerFrame::ToolsList(tools)).await
            }
            Inbound::MessageRequired => {
                send_frame(&mut sender, &ServerFrame::Error(MESSAGE_REQUIRED.to_string())).await
            }
            Inbound::Invalid => {
                send_frame(
                    &mut sender,
                    &ServerFrame::Error(INVALID_MESSAGE_FORMAT.to_string()),
                )
                .await
            }
            Inbound::Ignored => true,
        };
        if !delivered {
            break;
        }
    }

    cancel.cancel();
    reader.abort();
    info!("websocket client disconnected");
}

fn parse_client_message(text: &str) -> Inbound {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Inbound::Invalid;
    };
    match value.get("type").and_then(Value::as_str) {
        Some("chat_message") => {
            if value.get("message").is_none_or(Value::is_null) {
                return Inbound::MessageRequired;
            }
            match serde_json::from_value::<ClientMessage>(value) {
                Ok(ClientMessage::ChatMessage { message, .. }) if message.is_empty() => {
                    Inbound::MessageRequired
                }
                Ok(ClientMessage::ChatMessage { message, options }) => {
                    Inbound::Chat { message, options }
                }
                Ok(ClientMessage::GetTools) | Err(_) => Inbound::Invalid,
            }
        }
        Some("get_tools") => Inbound::GetTools,
        other => {
            debug!(kind = ?other, "ignoring websocket message");
            Inbound::Ignored
        }
    }
}

/// Streams one turn. Returns `false` once the socket can no longer be written.
async fn run_turn(
    sender: &mut WsSink,
    state: &AppState,
    message: ChatInput,
    options: &GenerationOptions,
    cancel: &CancellationToken,
) -> bool {
    if !send_frame(sender, &ServerFrame::Start).await {
        return false;
    }

    let mut turn = state
        .agent()
        .start_turn(message.into_messages(), options, cancel.child_token());
    info!(turn_id = %turn.id(), "websocket turn started");

    while let Some(item) = turn.next_event().await {
        match item {
            Ok(event) => {
                if !send_frame(sender, &ServerFrame::Event(event)).await {
                    return false;
                }
            }
            Err(TurnError::Cancelled) => return false,
            Err(e) => return send_frame(sender, &ServerFrame::Error(e.user_message())).await,
        }
    }

    send_frame(sender, &ServerFrame::End).await
}

async fn send_frame(sender: &mut WsSink, frame: &ServerFrame) -> bool {
    let json = match frame.to_ws_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to encode frame");
            return true;
        }
    };
    match sender.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "websocket write failed");
            false
        }
    }
}
