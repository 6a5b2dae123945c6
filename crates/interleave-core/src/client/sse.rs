//! HTTP SSE chat client: posts one request and yields decoded frames.

use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use bytes::Bytes;
use futures_util::stream::{BoxStream, unfold};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};
use url::Url;

use crate::providers::shared::USER_AGENT;
use crate::transport::frames::{ChatRequest, ServerFrame};
use crate::transport::reassembler::FrameDecoder;

pub const CONNECTION_LOST: &str = "connection lost";

/// Frames of one streamed turn. Ends after `end` or `error`.
pub type FrameStream = BoxStream<'static, Result<ServerFrame>>;

#[derive(Debug, Clone)]
pub struct SseChatClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl SseChatClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Starts a turn.
    ///
    /// # Errors
    /// Fails on connection errors and non-success statuses
    /// (`HTTP error! status: N`).
    pub async fn send(&self, request: &ChatRequest) -> Result<FrameStream> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("accept", "text/event-stream")
            .header("user-agent", USER_AGENT)
            .json(request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to reach {}: {e}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %body, "chat request rejected");
            return Err(anyhow!("HTTP error! status: {}", status.as_u16()));
        }

        Ok(Box::pin(frame_stream(Box::pin(response.bytes_stream()))))
    }
}

struct DecodeState<S> {
    bytes: S,
    decoder: FrameDecoder,
    ready: VecDeque<ServerFrame>,
    exhausted: bool,
    done: bool,
}

/// Decodes a byte stream into frames, stopping after the terminal frame.
///
/// A stream that ends or fails before `end`/`error` yields one
/// [`CONNECTION_LOST`] error.
pub fn frame_stream<S, E>(bytes: S) -> impl Stream<Item = Result<ServerFrame>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        exhausted: false,
        done: false,
    };

    unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            if let Some(frame) = state.ready.pop_front() {
                if matches!(frame, ServerFrame::End | ServerFrame::Error(_)) {
                    state.done = true;
                }
                return Some((Ok(frame), state));
            }

            if state.exhausted {
                state.done = true;
                return Some((Err(anyhow!(CONNECTION_LOST)), state));
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.decoder.push(&chunk)),
                Some(Err(e)) => {
                    warn!(error = %e, "stream read failed");
                    state.done = true;
                    return Some((Err(anyhow!(CONNECTION_LOST)), state));
                }
                None => {
                    state.exhausted = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
}
