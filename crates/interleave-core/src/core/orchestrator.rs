//! Agent loop: generate, execute tools, continue, until the model stops.
//!
//! A [`Turn`] is pull-driven. Each call to [`Turn::next_event`] advances the
//! loop just far enough to produce the next [`StreamEvent`], so a slow
//! consumer naturally slows the provider read and nothing is dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::{
    Config, GenerationOptions, GenerationSettings, McpServerConfig, WebSearchConfig,
};
use crate::core::accumulator::{ToolCall, TurnState};
use crate::core::events::{StreamEvent, TurnError};
use crate::core::executor::execute_call;
use crate::providers::anthropic::{AnthropicClient, AnthropicConfig};
use crate::providers::{ChatContentBlock, ChatMessage, ModelProvider, ProviderStream, StreamRequest};
use crate::tools::{ToolRegistry, ToolResult};

/// Shared, read-only agent: provider handle, tool registry, and settings.
///
/// One `Agent` serves every connection; per-request state lives in [`Turn`].
pub struct Agent {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    config: Config,
    system_prompt: Arc<str>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("tools", &self.registry.tool_names())
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

/// Collected result of a whole turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub response: String,
    pub thinking: String,
    /// `tool_result` and `tool_error` events, in execution order.
    pub tool_results: Vec<StreamEvent>,
    /// History including the assistant and tool messages this turn added.
    #[serde(skip)]
    pub messages: Vec<ChatMessage>,
}

impl Agent {
    /// # Errors
    /// Returns an error if the configured system prompt file cannot be read.
    pub fn new(
        config: Config,
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
    ) -> Result<Self> {
        let system_prompt = config.effective_system_prompt()?;
        Ok(Self {
            provider,
            registry,
            config,
            system_prompt: Arc::from(system_prompt),
        })
    }

    /// Builds an agent with the Anthropic client and the built-in tools.
    ///
    /// # Errors
    /// Returns an error if no API key is configured or the system prompt
    /// file cannot be read.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = AnthropicClient::new(AnthropicConfig::from_env(&config.providers.anthropic)?);
        Self::new(config, Arc::new(client), Arc::new(ToolRegistry::builtins()))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Starts a turn over `messages`, the history ending with the new user message.
    pub fn start_turn(
        &self,
        messages: Vec<ChatMessage>,
        options: &GenerationOptions,
        cancel: CancellationToken,
    ) -> Turn {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let settings = options.resolve(&self.config);
        let span = info_span!("turn", turn_id = %turn_id, model = %settings.model);

        Turn {
            id: turn_id,
            span,
            provider: Arc::clone(&self.provider),
            registry: Arc::clone(&self.registry),
            system_prompt: Arc::clone(&self.system_prompt),
            web_search: self
                .config
                .web_search
                .enabled
                .then(|| self.config.web_search.clone()),
            mcp_servers: self.config.mcp_servers.clone(),
            settings,
            max_rounds: self.config.max_rounds,
            tool_timeout: self.config.tool_timeout(),
            cancel,
            history: messages,
            state: TurnState::new(),
            phase: Phase::Generate,
            rounds: 0,
            queue: VecDeque::new(),
            completed: false,
        }
    }

    /// Runs a turn to completion and collects the text, thinking, and tool activity.
    ///
    /// # Errors
    /// Returns the turn's terminal error.
    pub async fn process_message(
        &self,
        messages: Vec<ChatMessage>,
        options: &GenerationOptions,
    ) -> Result<AgentResponse, TurnError> {
        let mut turn = self.start_turn(messages, options, CancellationToken::new());
        let mut tool_results = Vec::new();

        while let Some(item) = turn.next_event().await {
            let event = item?;
            if matches!(
                event,
                StreamEvent::ToolResult { .. } | StreamEvent::ToolError { .. }
            ) {
                tool_results.push(event);
            }
        }

        Ok(AgentResponse {
            response: turn.text().to_string(),
            thinking: turn.thinking().to_string(),
            tool_results,
            messages: turn.into_messages(),
        })
    }
}

enum Phase {
    Generate,
    Streaming(ProviderStream),
    Execute {
        calls: VecDeque<ToolCall>,
        blocks: Vec<ChatContentBlock>,
        results: Vec<ToolResult>,
    },
    Done,
}

/// One user request, from first generation to the final answer.
pub struct Turn {
    id: String,
    span: Span,
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    system_prompt: Arc<str>,
    web_search: Option<WebSearchConfig>,
    mcp_servers: Vec<McpServerConfig>,
    settings: GenerationSettings,
    max_rounds: usize,
    tool_timeout: Option<Duration>,
    cancel: CancellationToken,
    history: Vec<ChatMessage>,
    state: TurnState,
    phase: Phase,
    /// Tool rounds executed so far.
    rounds: usize,
    queue: VecDeque<StreamEvent>,
    completed: bool,
}

impl Turn {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Yields the next event, `Some(Err)` once on failure, then `None`.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, TurnError>> {
        let span = self.span.clone();
        self.advance().instrument(span).await
    }

    /// Adapts the turn into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent, TurnError>> + Send {
        futures_util::stream::unfold(self, |mut turn| async move {
            turn.next_event().await.map(|item| (item, turn))
        })
    }

    /// Response text so far, across all rounds.
    pub fn text(&self) -> &str {
        self.state.text()
    }

    pub fn thinking(&self) -> &str {
        self.state.thinking()
    }

    /// True once the model finished without requesting more tools.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Conversation history as extended by this turn.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.history
    }

    async fn advance(&mut self) -> Option<Result<StreamEvent, TurnError>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,
                Phase::Generate => {
                    if self.cancel.is_cancelled() {
                        return self.fail(TurnError::Cancelled);
                    }
                    info!(
                        round = self.rounds,
                        messages = self.history.len(),
                        "generation started"
                    );
                    let request = StreamRequest {
                        messages: &self.history,
                        tools: self.registry.definitions(),
                        web_search: self.web_search.as_ref(),
                        mcp_servers: &self.mcp_servers,
                        system: Some(&*self.system_prompt),
                        settings: &self.settings,
                    };
                    match open_stream(&*self.provider, request, &self.cancel).await {
                        Ok(stream) => self.phase = Phase::Streaming(stream),
                        Err(e) => return self.fail(e),
                    }
                }
                Phase::Streaming(mut stream) => {
                    let next = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return self.fail(TurnError::Cancelled),
                        next = stream.next() => next,
                    };
                    match next {
                        Some(Ok(event)) => {
                            if let Err(e) = self.state.apply(event, &mut self.queue) {
                                return self.fail(e.into());
                            }
                            self.phase = Phase::Streaming(stream);
                        }
                        Some(Err(e)) => return self.fail(e.into()),
                        None => {
                            if let Err(e) = self.finish_generation() {
                                return self.fail(e);
                            }
                        }
                    }
                }
                Phase::Execute {
                    mut calls,
                    blocks,
                    mut results,
                } => {
                    if let Some(call) = calls.pop_front() {
                        if self.cancel.is_cancelled() {
                            info!(remaining = calls.len() + 1, "cancelled before tool dispatch");
                            return self.fail(TurnError::Cancelled);
                        }
                        let outcome = tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => return self.fail(TurnError::Cancelled),
                            outcome = execute_call(&self.registry, &call, self.tool_timeout) => outcome,
                        };
                        results.push(outcome.result);
                        self.queue.push_back(outcome.event);
                        self.phase = Phase::Execute {
                            calls,
                            blocks,
                            results,
                        };
                    } else {
                        debug!(results = results.len(), "continuing with tool results");
                        self.history.push(ChatMessage::assistant_blocks(blocks));
                        self.history.push(ChatMessage::tool_results(results));
                        self.phase = Phase::Generate;
                    }
                }
            }
        }
    }

    /// Decides what follows a finished provider stream.
    fn finish_generation(&mut self) -> Result<(), TurnError> {
        if !self.state.is_finished() {
            warn!("provider stream ended without message_stop");
        }
        if let Some(reason) = self.state.stop_reason() {
            debug!(stop_reason = reason, "generation finished");
        }

        let (blocks, calls) = self.state.take_round();

        if calls.is_empty() {
            if !self.state.text().is_empty() && !blocks.is_empty() {
                self.history.push(ChatMessage::assistant_blocks(blocks));
            }
            self.completed = true;
            info!(rounds = self.rounds, "turn complete");
            return Ok(());
        }

        if self.rounds >= self.max_rounds {
            return Err(TurnError::ToolLoopLimit {
                rounds: self.rounds,
            });
        }

        self.rounds += 1;
        info!(round = self.rounds, calls = calls.len(), "executing tool calls");
        self.phase = Phase::Execute {
            calls: calls.into(),
            blocks,
            results: Vec::new(),
        };
        Ok(())
    }

    fn fail(&mut self, err: TurnError) -> Option<Result<StreamEvent, TurnError>> {
        self.phase = Phase::Done;
        self.queue.clear();
        match &err {
            TurnError::Cancelled => info!("turn cancelled"),
            other => error!(error = %other, "turn failed"),
        }
        Some(Err(err))
    }
}

/// Opens the provider stream unless the turn is cancelled first.
async fn open_stream(
    provider: &dyn ModelProvider,
    request: StreamRequest<'_>,
    cancel: &CancellationToken,
) -> Result<ProviderStream, TurnError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TurnError::Cancelled),
        result = provider.stream(request) => result.map_err(TurnError::from_anyhow),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::BoxFuture;
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::core::events::ToolOutput;
    use crate::providers::{
        MessageContent, ProviderError, ProviderEvent, ProviderResult, Role, StartedBlock, Usage,
    };

    /// Replays one scripted event list per generation round and records
    /// every history it was called with.
    struct ScriptedProvider {
        rounds: Mutex<VecDeque<Vec<ProviderResult<ProviderEvent>>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(rounds: Vec<Vec<ProviderResult<ProviderEvent>>>) -> Arc<Self> {
            Arc::new(Self {
                rounds: Mutex::new(rounds.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl ModelProvider for ScriptedProvider {
        fn stream<'a>(&'a self, request: StreamRequest<'a>) -> BoxFuture<'a, Result<ProviderStream>> {
            self.seen.lock().unwrap().push(request.messages.to_vec());
            let events = self.rounds.lock().unwrap().pop_front().unwrap_or_default();
            Box::pin(async move {
                let stream: ProviderStream = Box::pin(futures_util::stream::iter(events));
                Ok(stream)
            })
        }
    }

    fn text_round(text: &str) -> Vec<ProviderResult<ProviderEvent>> {
        vec![
            Ok(ProviderEvent::MessageStart {
                model: "test".into(),
                usage: Usage::default(),
            }),
            Ok(ProviderEvent::ContentBlockStart {
                index: 0,
                block: StartedBlock::Text,
            }),
            Ok(ProviderEvent::TextDelta {
                index: 0,
                text: text.into(),
            }),
            Ok(ProviderEvent::ContentBlockStop { index: 0 }),
            Ok(ProviderEvent::MessageDelta {
                stop_reason: Some("end_turn".into()),
                usage: None,
            }),
            Ok(ProviderEvent::MessageStop),
        ]
    }

    fn tool_round(calls: &[(&str, &str, Value)]) -> Vec<ProviderResult<ProviderEvent>> {
        let mut events = vec![
            Ok(ProviderEvent::ContentBlockStart {
                index: 0,
                block: StartedBlock::Thinking,
            }),
            Ok(ProviderEvent::ThinkingDelta {
                index: 0,
                thinking: "I should use a tool.".into(),
            }),
            Ok(ProviderEvent::SignatureDelta {
                index: 0,
                signature: "sig-1".into(),
            }),
            Ok(ProviderEvent::ContentBlockStop { index: 0 }),
        ];
        for (i, (id, name, input)) in calls.iter().enumerate() {
            let index = i + 1;
            events.push(Ok(ProviderEvent::ContentBlockStart {
                index,
                block: StartedBlock::ToolUse {
                    id: (*id).into(),
                    name: (*name).into(),
                },
            }));
            events.push(Ok(ProviderEvent::InputJsonDelta {
                index,
                partial_json: input.to_string(),
            }));
            events.push(Ok(ProviderEvent::ContentBlockStop { index }));
        }
        events.push(Ok(ProviderEvent::MessageDelta {
            stop_reason: Some("tool_use".into()),
            usage: None,
        }));
        events.push(Ok(ProviderEvent::MessageStop));
        events
    }

    fn agent(provider: Arc<ScriptedProvider>, registry: ToolRegistry, config: Config) -> Agent {
        Agent::new(config, provider, Arc::new(registry)).unwrap()
    }

    async fn collect(turn: &mut Turn) -> (Vec<StreamEvent>, Option<TurnError>) {
        let mut events = Vec::new();
        while let Some(item) = turn.next_event().await {
            match item {
                Ok(event) => events.push(event),
                Err(e) => return (events, Some(e)),
            }
        }
        (events, None)
    }

    #[tokio::test]
    async fn test_plain_answer_appends_assistant_message() {
        let provider = ScriptedProvider::new(vec![text_round("Hello!")]);
        let agent = agent(Arc::clone(&provider), ToolRegistry::builtins(), Config::default());

        let mut turn = agent.start_turn(
            vec![ChatMessage::user("Hi")],
            &GenerationOptions::default(),
            CancellationToken::new(),
        );
        let (events, err) = collect(&mut turn).await;

        assert!(err.is_none());
        assert!(turn.is_complete());
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentBlockStart {
                    block_type: "text".into()
                },
                StreamEvent::ResponseStart,
                StreamEvent::TextDelta {
                    content: "Hello!".into()
                },
                StreamEvent::ContentBlockStop,
            ]
        );
        assert_eq!(provider.calls(), 1);
        let history = turn.into_messages();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].text(), "Hello!");
    }

    #[tokio::test]
    async fn test_tool_round_feeds_results_back() {
        let provider = ScriptedProvider::new(vec![
            tool_round(&[("toolu_1", "calculate", json!({"expression": "2+2"}))]),
            text_round("2+2 is 4."),
        ]);
        let agent = agent(Arc::clone(&provider), ToolRegistry::builtins(), Config::default());

        let response = agent
            .process_message(vec![ChatMessage::user("What is 2+2?")], &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(response.response, "2+2 is 4.");
        assert_eq!(response.thinking, "I should use a tool.");
        assert_eq!(
            response.tool_results,
            vec![StreamEvent::ToolResult {
                tool: "calculate".into(),
                input: json!({"expression": "2+2"}),
                result: "The result of 2+2 is 4".into(),
            }]
        );

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let continuation = &seen[1];
        assert_eq!(continuation.len(), 3);
        let MessageContent::Blocks(assistant) = &continuation[1].content else {
            panic!("assistant turn should carry blocks");
        };
        assert_eq!(
            assistant[0],
            ChatContentBlock::Thinking {
                thinking: "I should use a tool.".into(),
                signature: "sig-1".into(),
            }
        );
        let MessageContent::Blocks(results) = &continuation[2].content else {
            panic!("tool results should be blocks");
        };
        assert_eq!(
            results[0],
            ChatContentBlock::ToolResult(ToolResult {
                tool_use_id: "toolu_1".into(),
                content: "The result of 2+2 is 4".into(),
                is_error: false,
            })
        );
        assert_eq!(response.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_results_keep_call_order() {
        let provider = ScriptedProvider::new(vec![
            tool_round(&[
                ("toolu_a", "get_weather", json!({"location": "Paris"})),
                ("toolu_b", "calculate", json!({"expression": "1+1"})),
            ]),
            text_round("Done."),
        ]);
        let agent = agent(Arc::clone(&provider), ToolRegistry::builtins(), Config::default());
        let response = agent
            .process_message(vec![ChatMessage::user("both")], &GenerationOptions::default())
            .await
            .unwrap();

        let tools: Vec<_> = response
            .tool_results
            .iter()
            .map(|e| match e {
                StreamEvent::ToolResult { tool, .. } => tool.as_str(),
                _ => "error",
            })
            .collect();
        assert_eq!(tools, vec!["get_weather", "calculate"]);

        let seen = provider.seen.lock().unwrap();
        let MessageContent::Blocks(results) = &seen[1][2].content else {
            panic!("tool results should be blocks");
        };
        let ids: Vec<_> = results
            .iter()
            .map(|b| match b {
                ChatContentBlock::ToolResult(r) => r.tool_use_id.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(ids, vec!["toolu_a", "toolu_b"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_still_gets_a_result() {
        let provider = ScriptedProvider::new(vec![
            tool_round(&[("toolu_1", "teleport", json!({}))]),
            text_round("I cannot do that."),
        ]);
        let agent = agent(Arc::clone(&provider), ToolRegistry::builtins(), Config::default());
        let response = agent
            .process_message(vec![ChatMessage::user("go")], &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(
            response.tool_results,
            vec![StreamEvent::ToolError {
                tool: "teleport".into(),
                error: "Tool not found: teleport".into(),
            }]
        );
        let seen = provider.seen.lock().unwrap();
        let MessageContent::Blocks(results) = &seen[1][2].content else {
            panic!("tool results should be blocks");
        };
        assert!(matches!(&results[0], ChatContentBlock::ToolResult(r) if r.is_error));
    }

    #[tokio::test]
    async fn test_round_limit_is_terminal() {
        let call = [("toolu_1", "calculate", json!({"expression": "1"}))];
        let provider = ScriptedProvider::new(vec![
            tool_round(&call),
            tool_round(&call),
            tool_round(&call),
        ]);
        let config = Config {
            max_rounds: 2,
            ..Config::default()
        };
        let agent = agent(Arc::clone(&provider), ToolRegistry::builtins(), config);

        let mut turn = agent.start_turn(
            vec![ChatMessage::user("loop")],
            &GenerationOptions::default(),
            CancellationToken::new(),
        );
        let (events, err) = collect(&mut turn).await;

        assert!(matches!(err, Some(TurnError::ToolLoopLimit { rounds: 2 })));
        let executed = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ToolResult { .. }))
            .count();
        assert_eq!(executed, 2);
        assert_eq!(provider.calls(), 3);
        assert!(turn.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_mid_stream_error_ends_turn() {
        let provider = ScriptedProvider::new(vec![vec![
            Ok(ProviderEvent::ContentBlockStart {
                index: 0,
                block: StartedBlock::Text,
            }),
            Ok(ProviderEvent::TextDelta {
                index: 0,
                text: "Partial".into(),
            }),
            Ok(ProviderEvent::Error {
                error_type: "overloaded_error".into(),
                message: "Overloaded".into(),
            }),
        ]]);
        let agent = agent(Arc::clone(&provider), ToolRegistry::builtins(), Config::default());

        let mut turn = agent.start_turn(
            vec![ChatMessage::user("Hi")],
            &GenerationOptions::default(),
            CancellationToken::new(),
        );
        let (events, err) = collect(&mut turn).await;

        assert_eq!(events.len(), 3);
        let err = err.unwrap();
        assert!(matches!(&err, TurnError::Provider(e) if e.is_overloaded()));
        assert!(!turn.is_complete());
        assert_eq!(turn.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_maps_to_provider_error() {
        let provider = ScriptedProvider::new(vec![vec![Err(ProviderError::timeout(
            "connection reset",
        ))]]);
        let agent = agent(provider, ToolRegistry::builtins(), Config::default());
        let result = agent
            .process_message(vec![ChatMessage::user("Hi")], &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(TurnError::Provider(_))));
    }

    #[tokio::test]
    async fn test_cancel_before_tool_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        let counter = Arc::clone(&hits);
        registry.add_tool("count", "Counts", Map::new(), move |_input: Value| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ToolOutput::success("counted")
            }
        });
        let provider = ScriptedProvider::new(vec![tool_round(&[("toolu_1", "count", json!({}))])]);
        let agent = agent(provider, registry, Config::default());

        let cancel = CancellationToken::new();
        let mut turn = agent.start_turn(
            vec![ChatMessage::user("count")],
            &GenerationOptions::default(),
            cancel.clone(),
        );

        // Drain until the tool block closes, then cancel.
        let mut stops = 0;
        while let Some(Ok(event)) = turn.next_event().await {
            if event == StreamEvent::ContentBlockStop {
                stops += 1;
                if stops == 2 {
                    break;
                }
            }
        }
        cancel.cancel();

        assert!(matches!(
            turn.next_event().await,
            Some(Err(TurnError::Cancelled))
        ));
        assert!(turn.next_event().await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_text_is_not_appended() {
        let provider = ScriptedProvider::new(vec![vec![
            Ok(ProviderEvent::ContentBlockStart {
                index: 0,
                block: StartedBlock::Text,
            }),
            Ok(ProviderEvent::ContentBlockStop { index: 0 }),
            Ok(ProviderEvent::MessageStop),
        ]]);
        let agent = agent(provider, ToolRegistry::builtins(), Config::default());
        let response = agent
            .process_message(vec![ChatMessage::user("Hi")], &GenerationOptions::default())
            .await
            .unwrap();
        assert!(response.response.is_empty());
        assert_eq!(response.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_into_stream_yields_same_events() {
        let provider = ScriptedProvider::new(vec![text_round("streamed")]);
        let agent = agent(provider, ToolRegistry::builtins(), Config::default());
        let turn = agent.start_turn(
            vec![ChatMessage::user("Hi")],
            &GenerationOptions::default(),
            CancellationToken::new(),
        );
        let events: Vec<_> = turn.into_stream().collect().await;
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(Result::is_ok));
    }
}
