//! Client-side reassembly: bytes to frames, frames to a conversation view.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::events::StreamEvent;
use crate::providers::{ChatMessage, MessageContent, Role};
use crate::transport::frames::{ServerFrame, ToolInfo, decode_sse};

/// Incremental SSE frame decoder.
///
/// Reads may split lines (and UTF-8 sequences) anywhere; only complete lines
/// are interpreted and the remainder is buffered for the next read.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one read and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ServerFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flushes a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<ServerFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    /// True when bytes or an unfinished frame are buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || !self.data.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<ServerFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => self.data.push(value.to_string()),
            _ => debug!(field, "ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<ServerFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        match decode_sse(event.as_deref(), &data) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, event = ?event, "discarding malformed frame");
                None
            }
        }
    }
}

/// One local tool call as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolActivity {
    Success {
        tool: String,
        input: Value,
        result: String,
    },
    Failure {
        tool: String,
        error: String,
    },
}

/// Web search results as relayed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub tool_use_id: String,
    pub content: Value,
}

/// A rendered message: either a user prompt or an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    pub role: Role,
    pub content: String,
    pub thinking: String,
    pub tools: Vec<ToolActivity>,
    pub web_search_queries: Vec<String>,
    pub web_search_results: Vec<SearchResults>,
}

impl MessageView {
    fn new(role: Role) -> Self {
        Self {
            role,
            content: String::new(),
            thinking: String::new(),
            tools: Vec::new(),
            web_search_queries: Vec::new(),
            web_search_results: Vec::new(),
        }
    }

    fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ThinkingDelta { content } => self.thinking.push_str(&content),
            StreamEvent::TextDelta { content } => self.content.push_str(&content),
            StreamEvent::ToolResult {
                tool,
                input,
                result,
            } => self.tools.push(ToolActivity::Success {
                tool,
                input,
                result,
            }),
            StreamEvent::ToolError { tool, error } => {
                self.tools.push(ToolActivity::Failure { tool, error });
            }
            StreamEvent::WebSearchQuery { query } => self.web_search_queries.push(query),
            StreamEvent::WebSearchResult {
                tool_use_id,
                content,
            } => self.web_search_results.push(SearchResults {
                tool_use_id,
                content,
            }),
            StreamEvent::ContentBlockStart { .. }
            | StreamEvent::ThinkingStart
            | StreamEvent::ResponseStart
            | StreamEvent::WebSearchStart { .. }
            | StreamEvent::ContentBlockStop => {}
        }
    }
}

/// What applying a frame did to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Started,
    Updated,
    /// The turn ended; `appended` is false when the reply had no text.
    Completed { appended: bool },
    Failed(String),
    Tools,
}

/// Conversation state folded from server frames.
#[derive(Debug, Default)]
pub struct Conversation {
    history: Vec<MessageView>,
    current: Option<MessageView>,
    error: Option<String>,
    tools: Vec<ToolInfo>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a user prompt and clears any previous error.
    pub fn push_user(&mut self, text: impl Into<String>) {
        let mut view = MessageView::new(Role::User);
        view.content = text.into();
        self.history.push(view);
        self.error = None;
    }

    pub fn apply(&mut self, frame: ServerFrame) -> FrameOutcome {
        match frame {
            ServerFrame::Start => {
                self.current = Some(MessageView::new(Role::Assistant));
                self.error = None;
                FrameOutcome::Started
            }
            ServerFrame::Event(event) => {
                self.current
                    .get_or_insert_with(|| MessageView::new(Role::Assistant))
                    .apply(event);
                FrameOutcome::Updated
            }
            ServerFrame::End => {
                let appended = match self.current.take() {
                    Some(message) if !message.content.is_empty() => {
                        self.history.push(message);
                        true
                    }
                    _ => false,
                };
                FrameOutcome::Completed { appended }
            }
            ServerFrame::Error(message) => {
                self.current = None;
                self.error = Some(message.clone());
                FrameOutcome::Failed(message)
            }
            ServerFrame::ToolsList(tools) => {
                self.tools = tools;
                FrameOutcome::Tools
            }
        }
    }

    /// Ends an in-flight reply after the connection dropped.
    pub fn connection_lost(&mut self, message: impl Into<String>) {
        self.current = None;
        self.error = Some(message.into());
    }

    pub fn history(&self) -> &[MessageView] {
        &self.history
    }

    pub fn current(&self) -> Option<&MessageView> {
        self.current.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    /// True while a reply is streaming; input stays disabled until it ends.
    pub fn is_streaming(&self) -> bool {
        self.current.is_some()
    }

    /// History as plain-text messages for the next request.
    pub fn to_chat_history(&self) -> Vec<ChatMessage> {
        self.history
            .iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: MessageContent::Text(m.content.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const TURN: &str = concat!(
        "event: start\ndata: {\"message\":\"Processing...\"}\n\n",
        "event: chunk\ndata: {\"type\":\"thinking_delta\",\"content\":\"Adding \u{1F9EE}\"}\n\n",
        "event: chunk\ndata: {\"type\":\"tool_result\",\"tool\":\"calculate\",\"input\":{\"expression\":\"2+2\"},\"result\":\"The result of 2+2 is 4\"}\n\n",
        "event: chunk\ndata: {\"type\":\"text_delta\",\"content\":\"2+2 \"}\n\n",
        "event: chunk\ndata: {\"type\":\"text_delta\",\"content\":\"is 4.\"}\n\n",
        "event: end\ndata: {\"message\":\"Complete\"}\n\n",
    );

    fn decode_in_chunks(bytes: &[u8], size: usize) -> Vec<ServerFrame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in bytes.chunks(size) {
            frames.extend(decoder.push(chunk));
        }
        frames.extend(decoder.finish());
        frames
    }

    #[test]
    fn test_split_reads_yield_the_same_frames() {
        let whole = decode_in_chunks(TURN.as_bytes(), TURN.len());
        assert_eq!(whole.len(), 6);
        for size in [1, 3, 7, 64] {
            assert_eq!(decode_in_chunks(TURN.as_bytes(), size), whole, "chunk size {size}");
        }
        assert_eq!(
            whole[1],
            ServerFrame::Event(StreamEvent::ThinkingDelta {
                content: "Adding \u{1F9EE}".into()
            })
        );
    }

    #[test]
    fn test_malformed_frame_is_dropped_and_stream_continues() {
        let input = concat!(
            "event: chunk\ndata: {\"type\":\"text_delta\",\"con\n\n",
            "event: chunk\r\ndata: {\"type\":\"text_delta\",\"content\":\"ok\"}\r\n\r\n",
        );
        let frames = decode_in_chunks(input.as_bytes(), 5);
        assert_eq!(
            frames,
            vec![ServerFrame::Event(StreamEvent::TextDelta {
                content: "ok".into()
            })]
        );
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"event: end\ndata: {\"mess").is_empty());
        assert!(decoder.has_pending());
        let frames = decoder.push(b"age\":\"Complete\"}\n\n");
        assert_eq!(frames, vec![ServerFrame::End]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_comments_are_ignored() {
        let frames = decode_in_chunks(b": keep-alive\n\nevent: end\ndata: {}\n\n", 4);
        assert_eq!(frames, vec![ServerFrame::End]);
    }

    #[test]
    fn test_completed_turn_is_appended() {
        let mut conversation = Conversation::new();
        conversation.push_user("What is 2+2?");
        let mut outcomes = Vec::new();
        for frame in decode_in_chunks(TURN.as_bytes(), 11) {
            outcomes.push(conversation.apply(frame));
        }

        assert_eq!(outcomes.last(), Some(&FrameOutcome::Completed { appended: true }));
        assert!(!conversation.is_streaming());
        let reply = &conversation.history()[1];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "2+2 is 4.");
        assert_eq!(reply.thinking, "Adding \u{1F9EE}");
        assert_eq!(
            reply.tools,
            vec![ToolActivity::Success {
                tool: "calculate".into(),
                input: json!({"expression": "2+2"}),
                result: "The result of 2+2 is 4".into(),
            }]
        );
        assert_eq!(conversation.to_chat_history().len(), 2);
    }

    #[test]
    fn test_empty_reply_is_discarded() {
        let mut conversation = Conversation::new();
        conversation.apply(ServerFrame::Start);
        conversation.apply(ServerFrame::Event(StreamEvent::ThinkingDelta {
            content: "hmm".into(),
        }));
        assert_eq!(
            conversation.apply(ServerFrame::End),
            FrameOutcome::Completed { appended: false }
        );
        assert!(conversation.history().is_empty());
    }

    #[test]
    fn test_error_discards_current_and_is_visible() {
        let mut conversation = Conversation::new();
        conversation.apply(ServerFrame::Start);
        conversation.apply(ServerFrame::Event(StreamEvent::TextDelta {
            content: "Partial".into(),
        }));
        conversation.apply(ServerFrame::Error("Service Temporarily Overloaded".into()));

        assert!(conversation.current().is_none());
        assert!(conversation.history().is_empty());
        assert_eq!(conversation.error(), Some("Service Temporarily Overloaded"));

        conversation.push_user("retry");
        assert!(conversation.error().is_none());
    }

    #[test]
    fn test_web_search_activity_is_collected() {
        let mut conversation = Conversation::new();
        conversation.apply(ServerFrame::Start);
        for event in [
            StreamEvent::WebSearchStart {
                tool: "web_search".into(),
                id: "srvtoolu_1".into(),
            },
            StreamEvent::WebSearchQuery {
                query: "rust async".into(),
            },
            StreamEvent::WebSearchResult {
                tool_use_id: "srvtoolu_1".into(),
                content: json!([{"url": "https://example.com"}]),
            },
        ] {
            conversation.apply(ServerFrame::Event(event));
        }
        let current = conversation.current().unwrap();
        assert_eq!(current.web_search_queries, vec!["rust async"]);
        assert_eq!(current.web_search_results[0].tool_use_id, "srvtoolu_1");
    }
}
