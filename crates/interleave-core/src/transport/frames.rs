//! Wire frames shared by the server encoder and the client decoder.
//!
//! One turn is framed as `start`, then one frame per [`StreamEvent`], then
//! either `end` or `error`. Over SSE the frame kind is the `event:` name and
//! the payload is the `data:` JSON. Over WebSocket every frame is a single
//! JSON object tagged by `type`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::GenerationOptions;
use crate::core::events::StreamEvent;
use crate::providers::ChatMessage;
use crate::tools::ToolDefinition;

pub const START_MESSAGE: &str = "Processing...";
pub const COMPLETE_MESSAGE: &str = "Complete";
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";
pub const MESSAGE_REQUIRED: &str = "Message is required";

/// SSE `event:` names.
pub mod sse_event {
    pub const START: &str = "start";
    pub const CHUNK: &str = "chunk";
    pub const END: &str = "end";
    pub const ERROR: &str = "error";
}

/// Public description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDefinition> for ToolInfo {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            parameters: def.parameters(),
        }
    }
}

/// One server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Start,
    Event(StreamEvent),
    End,
    Error(String),
    ToolsList(Vec<ToolInfo>),
}

impl ServerFrame {
    /// SSE `event:` name. Tool listings are WebSocket-only and reuse `chunk`.
    pub fn sse_event_name(&self) -> &'static str {
        match self {
            ServerFrame::Start => sse_event::START,
            ServerFrame::Event(_) | ServerFrame::ToolsList(_) => sse_event::CHUNK,
            ServerFrame::End => sse_event::END,
            ServerFrame::Error(_) => sse_event::ERROR,
        }
    }

    /// SSE `data:` payload.
    ///
    /// # Errors
    /// Returns the serializer error, which only occurs for non-string map keys.
    pub fn sse_data(&self) -> Result<String, serde_json::Error> {
        match self {
            ServerFrame::Start => Ok(json!({ "message": START_MESSAGE }).to_string()),
            ServerFrame::Event(event) => serde_json::to_string(event),
            ServerFrame::End => Ok(json!({ "message": COMPLETE_MESSAGE }).to_string()),
            ServerFrame::Error(message) => Ok(json!({ "error": message }).to_string()),
            ServerFrame::ToolsList(tools) => serde_json::to_string(&json!({ "tools": tools })),
        }
    }

    /// Full SSE frame text, terminated by the blank line.
    ///
    /// # Errors
    /// See [`ServerFrame::sse_data`].
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "event: {}\ndata: {}\n\n",
            self.sse_event_name(),
            self.sse_data()?
        ))
    }

    /// WebSocket JSON message.
    ///
    /// # Errors
    /// See [`ServerFrame::sse_data`].
    pub fn to_ws_json(&self) -> Result<String, serde_json::Error> {
        match self {
            ServerFrame::Start => Ok(json!({ "type": "message_start" }).to_string()),
            ServerFrame::Event(event) => serde_json::to_string(event),
            ServerFrame::End => Ok(json!({ "type": "message_complete" }).to_string()),
            ServerFrame::Error(message) => {
                Ok(json!({ "type": "error", "error": message }).to_string())
            }
            ServerFrame::ToolsList(tools) => {
                serde_json::to_string(&json!({ "type": "tools_list", "tools": tools }))
            }
        }
    }
}

/// Why a frame could not be decoded.
#[derive(Debug)]
pub enum FrameError {
    Json(serde_json::Error),
    /// A JSON payload without the fields its frame kind needs.
    Shape(String),
    UnknownEvent(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Json(e) => write!(f, "invalid frame JSON: {e}"),
            FrameError::Shape(msg) => write!(f, "unexpected frame shape: {msg}"),
            FrameError::UnknownEvent(name) => write!(f, "unknown SSE event: {name}"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        FrameError::Json(e)
    }
}

/// Decodes one SSE frame from its `event:` name and `data:` payload.
///
/// A frame without an `event:` line is treated as `chunk`.
///
/// # Errors
/// Returns a [`FrameError`] for unknown event names or malformed payloads.
pub fn decode_sse(event: Option<&str>, data: &str) -> Result<ServerFrame, FrameError> {
    match event.unwrap_or(sse_event::CHUNK) {
        sse_event::START => Ok(ServerFrame::Start),
        sse_event::END => Ok(ServerFrame::End),
        sse_event::ERROR => {
            let value: Value = serde_json::from_str(data)?;
            Ok(ServerFrame::Error(error_text(&value)?))
        }
        sse_event::CHUNK => Ok(ServerFrame::Event(serde_json::from_str(data)?)),
        other => Err(FrameError::UnknownEvent(other.to_string())),
    }
}

/// Decodes one WebSocket JSON message.
///
/// # Errors
/// Returns a [`FrameError`] when the text is not a known frame.
pub fn decode_ws_message(text: &str) -> Result<ServerFrame, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("type").and_then(Value::as_str) {
        Some("message_start") => Ok(ServerFrame::Start),
        Some("message_complete") => Ok(ServerFrame::End),
        Some("error") => Ok(ServerFrame::Error(error_text(&value)?)),
        Some("tools_list") => {
            let tools = value
                .get("tools")
                .cloned()
                .ok_or_else(|| FrameError::Shape("tools_list without tools".to_string()))?;
            Ok(ServerFrame::ToolsList(serde_json::from_value(tools)?))
        }
        _ => Ok(ServerFrame::Event(serde_json::from_value(value)?)),
    }
}

fn error_text(value: &Value) -> Result<String, FrameError> {
    value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FrameError::Shape("error frame without error text".to_string()))
}

/// The user turn: a single string or a full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatInput {
    Text(String),
    History(Vec<ChatMessage>),
}

impl ChatInput {
    pub fn is_empty(&self) -> bool {
        match self {
            ChatInput::Text(text) => text.trim().is_empty(),
            ChatInput::History(messages) => messages.is_empty(),
        }
    }

    /// History to start a turn from; a bare string becomes one user message.
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            ChatInput::Text(text) => vec![ChatMessage::user(text)],
            ChatInput::History(messages) => messages,
        }
    }
}

/// Body of `POST {base}/chat/stream`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatInput>,
    #[serde(default)]
    pub options: GenerationOptions,
}

/// Client-to-server WebSocket messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ChatMessage {
        message: ChatInput,
        #[serde(default)]
        options: GenerationOptions,
    },
    GetTools,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Role;
    use crate::tools::ToolRegistry;

    #[test]
    fn test_sse_frames_match_wire_format() {
        assert_eq!(
            ServerFrame::Start.to_sse().unwrap(),
            "event: start\ndata: {\"message\":\"Processing...\"}\n\n"
        );
        assert_eq!(
            ServerFrame::Event(StreamEvent::TextDelta {
                content: "Hi".into()
            })
            .to_sse()
            .unwrap(),
            "event: chunk\ndata: {\"type\":\"text_delta\",\"content\":\"Hi\"}\n\n"
        );
        assert_eq!(
            ServerFrame::End.to_sse().unwrap(),
            "event: end\ndata: {\"message\":\"Complete\"}\n\n"
        );
        assert_eq!(
            ServerFrame::Error("boom".into()).sse_data().unwrap(),
            "{\"error\":\"boom\"}"
        );
    }

    #[test]
    fn test_ws_messages_decode_to_the_same_frames() {
        let tools: Vec<ToolInfo> = ToolRegistry::builtins()
            .definitions()
            .iter()
            .map(ToolInfo::from)
            .collect();
        let frames = vec![
            ServerFrame::Start,
            ServerFrame::Event(StreamEvent::ThinkingStart),
            ServerFrame::End,
            ServerFrame::Error("Request failed: HTTP 500".into()),
            ServerFrame::ToolsList(tools),
        ];
        for frame in frames {
            let text = frame.to_ws_json().unwrap();
            assert_eq!(decode_ws_message(&text).unwrap(), frame);
        }
    }

    #[test]
    fn test_tools_list_carries_parameters_not_schema() {
        let text = ServerFrame::ToolsList(
            ToolRegistry::builtins()
                .definitions()
                .iter()
                .map(ToolInfo::from)
                .collect(),
        )
        .to_ws_json()
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tools"][0]["name"], "calculate");
        assert_eq!(value["tools"][0]["parameters"]["expression"]["type"], "string");
    }

    #[test]
    fn test_decode_sse_rejects_garbage() {
        assert!(matches!(
            decode_sse(Some("chunk"), "{not json"),
            Err(FrameError::Json(_))
        ));
        assert!(matches!(
            decode_sse(Some("ping"), "{}"),
            Err(FrameError::UnknownEvent(_))
        ));
        assert!(matches!(
            decode_sse(Some("error"), "{\"message\":\"x\"}"),
            Err(FrameError::Shape(_))
        ));
        assert_eq!(
            decode_sse(None, "{\"type\":\"content_block_stop\"}").unwrap(),
            ServerFrame::Event(StreamEvent::ContentBlockStop)
        );
    }

    #[test]
    fn test_client_messages_parse() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"chat_message","message":"What is 2+2?","options":{"maxTokens":512}}"#,
        )
        .unwrap();
        let ClientMessage::ChatMessage { message, options } = msg else {
            panic!("expected chat_message");
        };
        assert_eq!(options.max_tokens, Some(512));
        let history = message.into_messages();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"get_tools"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetTools);
    }

    #[test]
    fn test_chat_request_accepts_history_and_detects_empty() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message":[{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello"},{"role":"user","content":"Bye"}]}"#,
        )
        .unwrap();
        let input = req.message.unwrap();
        assert!(!input.is_empty());
        assert_eq!(input.into_messages().len(), 3);

        let req: ChatRequest = serde_json::from_str(r#"{"message":"   "}"#).unwrap();
        assert!(req.message.unwrap().is_empty());

        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(req.message.is_none());
    }
}
