use std::pin::Pin;
use std::task::{Context, Poll};

use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::providers::shared::{
    ProviderError, ProviderErrorKind, ProviderEvent, ProviderResult, StartedBlock, Usage,
};

/// Decodes an Anthropic SSE byte stream into [`ProviderEvent`]s.
pub struct SseParser<S> {
    inner: EventStream<S>,
}

impl<S> SseParser<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
        }
    }
}

impl<S, E> Stream for SseParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ProviderResult<ProviderEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(parse_event(&event.event, &event.data))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(ProviderError::new(
                ProviderErrorKind::Parse,
                format!("SSE stream error: {e}"),
            )))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn parse_data<T: DeserializeOwned>(event_type: &str, data: &str) -> ProviderResult<T> {
    if data.trim().is_empty() {
        return Err(ProviderError::new(
            ProviderErrorKind::Parse,
            format!("Missing data for {event_type}"),
        ));
    }
    serde_json::from_str(data).map_err(|err| {
        ProviderError::new(
            ProviderErrorKind::Parse,
            format!("Failed to parse {event_type}: {err}"),
        )
    })
}

/// Maps one SSE event (name + data) to a provider event.
///
/// # Errors
/// Returns a parse error for malformed payloads. Unknown event names and
/// delta types map to [`ProviderEvent::Ignored`].
pub fn parse_event(event_type: &str, data: &str) -> ProviderResult<ProviderEvent> {
    match event_type {
        "ping" => Ok(ProviderEvent::Ping),
        "message_stop" => Ok(ProviderEvent::MessageStop),
        "message_start" => {
            let parsed: SseMessageStart = parse_data(event_type, data)?;
            Ok(ProviderEvent::MessageStart {
                model: parsed.message.model,
                usage: parsed.message.usage.into(),
            })
        }
        "content_block_start" => {
            let parsed: SseContentBlockStart = parse_data(event_type, data)?;
            Ok(ProviderEvent::ContentBlockStart {
                index: parsed.index,
                block: parsed.content_block.into_started()?,
            })
        }
        "content_block_delta" => {
            let parsed: SseContentBlockDelta = parse_data(event_type, data)?;
            let index = parsed.index;
            let delta = parsed.delta;
            match delta.delta_type.as_str() {
                "text_delta" => Ok(ProviderEvent::TextDelta {
                    index,
                    text: delta.text.unwrap_or_default(),
                }),
                "input_json_delta" => Ok(ProviderEvent::InputJsonDelta {
                    index,
                    partial_json: delta.partial_json.unwrap_or_default(),
                }),
                "thinking_delta" => Ok(ProviderEvent::ThinkingDelta {
                    index,
                    thinking: delta.thinking.unwrap_or_default(),
                }),
                "signature_delta" => Ok(ProviderEvent::SignatureDelta {
                    index,
                    signature: delta.signature.unwrap_or_default(),
                }),
                other => {
                    debug!(index, delta_type = other, "unhandled delta type");
                    Ok(ProviderEvent::Ignored {
                        kind: other.to_string(),
                    })
                }
            }
        }
        "content_block_stop" => {
            let parsed: SseIndexOnly = parse_data(event_type, data)?;
            Ok(ProviderEvent::ContentBlockStop {
                index: parsed.index,
            })
        }
        "message_delta" => {
            let parsed: SseMessageDelta = parse_data(event_type, data)?;
            Ok(ProviderEvent::MessageDelta {
                stop_reason: parsed.delta.stop_reason,
                usage: parsed.usage.map(Into::into),
            })
        }
        "error" => {
            let parsed: SseError = parse_data(event_type, data)?;
            Ok(ProviderEvent::Error {
                error_type: parsed.error.error_type,
                message: parsed.error.message,
            })
        }
        other => {
            debug!(event_type = other, "unhandled SSE event");
            Ok(ProviderEvent::Ignored {
                kind: other.to_string(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct SseMessageStart {
    message: SseMessageInfo,
}

#[derive(Debug, Deserialize)]
struct SseMessageInfo {
    model: String,
    #[serde(default)]
    usage: SseUsage,
}

#[derive(Debug, Default, Deserialize)]
struct SseUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

impl From<SseUsage> for Usage {
    fn from(u: SseUsage) -> Self {
        Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            cache_read_input_tokens: u.cache_read_input_tokens,
            cache_creation_input_tokens: u.cache_creation_input_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SseContentBlockStart {
    index: usize,
    content_block: SseContentBlock,
}

#[derive(Debug, Deserialize)]
struct SseContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tool_use_id: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    data: Option<String>,
}

impl SseContentBlock {
    fn into_started(self) -> ProviderResult<StartedBlock> {
        let missing = |field: &str| {
            ProviderError::new(
                ProviderErrorKind::Parse,
                format!("{} block missing {field}", self.block_type),
            )
        };
        let block = match self.block_type.as_str() {
            "text" => StartedBlock::Text,
            "thinking" => StartedBlock::Thinking,
            "redacted_thinking" => StartedBlock::RedactedThinking {
                data: self.data.clone().unwrap_or_default(),
            },
            "tool_use" | "server_tool_use" => {
                let id = self.id.clone().ok_or_else(|| missing("id"))?;
                let name = self.name.clone().ok_or_else(|| missing("name"))?;
                if self.block_type == "tool_use" {
                    StartedBlock::ToolUse { id, name }
                } else {
                    StartedBlock::ServerToolUse { id, name }
                }
            }
            "web_search_tool_result" => StartedBlock::WebSearchToolResult {
                tool_use_id: self
                    .tool_use_id
                    .clone()
                    .ok_or_else(|| missing("tool_use_id"))?,
                content: self.content.clone().unwrap_or(Value::Null),
            },
            _ => StartedBlock::Other {
                block_type: self.block_type.clone(),
            },
        };
        Ok(block)
    }
}

#[derive(Debug, Deserialize)]
struct SseContentBlockDelta {
    index: usize,
    delta: SseDelta,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(rename = "type")]
    delta_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseIndexOnly {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct SseMessageDelta {
    delta: SseMessageDeltaInner,
    #[serde(default)]
    usage: Option<SseUsage>,
}

#[derive(Debug, Deserialize)]
struct SseMessageDeltaInner {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseError {
    error: SseErrorInfo,
}

#[derive(Debug, Deserialize)]
struct SseErrorInfo {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
