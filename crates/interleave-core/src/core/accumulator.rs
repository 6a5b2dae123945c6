//! Per-block state machine over provider events.
//!
//! Every content block moves through `start -> delta* -> stop`. Deltas are
//! relayed as they arrive; tool input JSON is buffered and parsed only at
//! stop. Finalized blocks are collected in stop order for replay in the
//! continuation request.

use std::collections::{HashMap, VecDeque};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::events::StreamEvent;
use crate::providers::{ChatContentBlock, ProviderError, ProviderEvent, StartedBlock};

/// Fallback query shown when a server search has no `query` field.
const DEFAULT_SEARCH_QUERY: &str = "web content";

/// A completed local tool invocation waiting for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug)]
enum BlockState {
    Thinking {
        thinking: String,
        signature: String,
        started: bool,
    },
    Text {
        text: String,
        started: bool,
    },
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
    ServerToolUse {
        id: String,
        name: String,
        json: String,
    },
    /// Arrived whole at start; kept as-is.
    Complete(ChatContentBlock),
    /// Unknown block type; events are relayed but nothing is kept.
    Ignored,
}

/// Accumulated state for one turn.
///
/// `blocks` and `pending` are per generation round and drained by
/// [`TurnState::take_round`]; `text` and `thinking` span the whole turn.
#[derive(Debug, Default)]
pub struct TurnState {
    open: HashMap<usize, BlockState>,
    blocks: Vec<ChatContentBlock>,
    pending: Vec<ToolCall>,
    text: String,
    thinking: String,
    stop_reason: Option<String>,
    finished: bool,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one provider event, pushing any resulting wire events.
    ///
    /// # Errors
    /// Returns the provider's error when the stream carries an `error` event.
    pub fn apply(
        &mut self,
        event: ProviderEvent,
        out: &mut VecDeque<StreamEvent>,
    ) -> Result<(), ProviderError> {
        match event {
            ProviderEvent::MessageStart { model, usage } => {
                debug!(
                    model = %model,
                    input_tokens = usage.input_tokens,
                    cache_read = usage.cache_read_input_tokens,
                    "message started"
                );
            }
            ProviderEvent::ContentBlockStart { index, block } => {
                self.start_block(index, block, out);
            }
            ProviderEvent::TextDelta { index, text } => {
                if let Some(BlockState::Text {
                    text: buffer,
                    started,
                }) = self.open.get_mut(&index)
                {
                    if !*started {
                        *started = true;
                        out.push_back(StreamEvent::ResponseStart);
                    }
                    buffer.push_str(&text);
                    self.text.push_str(&text);
                    out.push_back(StreamEvent::TextDelta { content: text });
                } else {
                    debug!(index, "text delta for a block that is not text; ignored");
                }
            }
            ProviderEvent::ThinkingDelta { index, thinking } => {
                if let Some(BlockState::Thinking {
                    thinking: buffer,
                    started,
                    ..
                }) = self.open.get_mut(&index)
                {
                    if !*started {
                        *started = true;
                        out.push_back(StreamEvent::ThinkingStart);
                    }
                    buffer.push_str(&thinking);
                    self.thinking.push_str(&thinking);
                    out.push_back(StreamEvent::ThinkingDelta { content: thinking });
                } else {
                    debug!(index, "thinking delta for a block that is not thinking; ignored");
                }
            }
            ProviderEvent::SignatureDelta { index, signature } => {
                if let Some(BlockState::Thinking {
                    signature: buffer, ..
                }) = self.open.get_mut(&index)
                {
                    buffer.push_str(&signature);
                }
            }
            ProviderEvent::InputJsonDelta {
                index,
                partial_json,
            } => match self.open.get_mut(&index) {
                Some(BlockState::ToolUse { json, .. } | BlockState::ServerToolUse { json, .. }) => {
                    json.push_str(&partial_json);
                }
                _ => debug!(index, "input json delta for a non-tool block; ignored"),
            },
            ProviderEvent::ContentBlockStop { index } => {
                self.stop_block(index, out);
            }
            ProviderEvent::MessageDelta { stop_reason, usage } => {
                if let Some(usage) = usage {
                    debug!(output_tokens = usage.output_tokens, "usage update");
                }
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
            }
            ProviderEvent::MessageStop => {
                self.finished = true;
            }
            ProviderEvent::Ping => {}
            ProviderEvent::Ignored { kind } => debug!(kind = %kind, "skipping provider event"),
            ProviderEvent::Error {
                error_type,
                message,
            } => {
                return Err(ProviderError::api_error(&error_type, &message));
            }
        }
        Ok(())
    }

    fn start_block(&mut self, index: usize, block: StartedBlock, out: &mut VecDeque<StreamEvent>) {
        out.push_back(StreamEvent::ContentBlockStart {
            block_type: block.block_type().to_string(),
        });

        let state = match block {
            StartedBlock::Text => BlockState::Text {
                text: String::new(),
                started: false,
            },
            StartedBlock::Thinking => BlockState::Thinking {
                thinking: String::new(),
                signature: String::new(),
                started: false,
            },
            StartedBlock::RedactedThinking { data } => {
                BlockState::Complete(ChatContentBlock::RedactedThinking { data })
            }
            StartedBlock::ToolUse { id, name } => BlockState::ToolUse {
                id,
                name,
                json: String::new(),
            },
            StartedBlock::ServerToolUse { id, name } => {
                out.push_back(StreamEvent::WebSearchStart {
                    tool: name.clone(),
                    id: id.clone(),
                });
                BlockState::ServerToolUse {
                    id,
                    name,
                    json: String::new(),
                }
            }
            StartedBlock::WebSearchToolResult {
                tool_use_id,
                content,
            } => {
                out.push_back(StreamEvent::WebSearchResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                });
                BlockState::Complete(ChatContentBlock::WebSearchToolResult {
                    tool_use_id,
                    content,
                })
            }
            StartedBlock::Other { block_type } => {
                debug!(block_type = %block_type, "unhandled block type");
                BlockState::Ignored
            }
        };

        self.open.insert(index, state);
    }

    fn stop_block(&mut self, index: usize, out: &mut VecDeque<StreamEvent>) {
        let Some(state) = self.open.remove(&index) else {
            debug!(index, "stop for unknown block");
            out.push_back(StreamEvent::ContentBlockStop);
            return;
        };

        match state {
            BlockState::Thinking {
                thinking,
                signature,
                ..
            } => {
                self.blocks.push(ChatContentBlock::Thinking {
                    thinking,
                    signature,
                });
            }
            BlockState::Text { text, .. } => {
                if !text.is_empty() {
                    self.blocks.push(ChatContentBlock::Text { text });
                }
            }
            BlockState::ToolUse { id, name, json } => match parse_tool_input(&json) {
                Ok(input) => {
                    debug!(tool = %name, id = %id, "tool call parsed");
                    self.blocks.push(ChatContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    });
                    self.pending.push(ToolCall { id, name, input });
                }
                Err(e) => {
                    warn!(tool = %name, id = %id, error = %e, "dropping tool call with invalid input JSON");
                }
            },
            BlockState::ServerToolUse { id, name, json } => {
                let input = match parse_tool_input(&json) {
                    Ok(input) => {
                        let query = input
                            .get("query")
                            .and_then(Value::as_str)
                            .filter(|q| !q.is_empty())
                            .unwrap_or(DEFAULT_SEARCH_QUERY)
                            .to_string();
                        out.push_back(StreamEvent::WebSearchQuery { query });
                        input
                    }
                    Err(e) => {
                        warn!(tool = %name, id = %id, error = %e, "server tool input is not valid JSON");
                        Value::Object(Map::new())
                    }
                };
                self.blocks
                    .push(ChatContentBlock::ServerToolUse { id, name, input });
            }
            BlockState::Complete(block) => self.blocks.push(block),
            BlockState::Ignored => {}
        }

        out.push_back(StreamEvent::ContentBlockStop);
    }

    /// Drains the finalized blocks and pending calls of the current round.
    pub fn take_round(&mut self) -> (Vec<ChatContentBlock>, Vec<ToolCall>) {
        self.open.clear();
        self.finished = false;
        self.stop_reason = None;
        (
            std::mem::take(&mut self.blocks),
            std::mem::take(&mut self.pending),
        )
    }

    pub fn has_pending_calls(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Response text across every round of the turn.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Thinking text across every round of the turn.
    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    /// True once `message_stop` has been seen for the current round.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Parses a buffered tool input. An empty buffer is an empty object.
///
/// # Errors
/// Returns the JSON error when the buffer is not valid JSON.
pub fn parse_tool_input(json: &str) -> Result<Value, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(json)
}
