//! Terminal chat client.
//!
//! Reads prompts line by line from stdin, sends the whole conversation to the
//! server, and prints the reply as frames arrive. `/quit` or EOF ends the
//! session.

use std::io::Write;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use interleave_core::client::{
    CONNECTION_LOST, SseChatClient, WsChatClient, WsEvent, chat_stream_url, ws_url,
};
use interleave_core::config::GenerationOptions;
use interleave_core::core::StreamEvent;
use interleave_core::transport::{
    ChatInput, ChatRequest, Conversation, FrameOutcome, ReconnectPolicy, ServerFrame,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

pub struct ChatRunOptions<'a> {
    pub server: &'a str,
    pub base_path: &'a str,
    pub websocket: bool,
    pub options: GenerationOptions,
}

enum Transport {
    Sse(SseChatClient),
    Ws {
        client: WsChatClient,
        url: Url,
        policy: ReconnectPolicy,
    },
}

pub async fn run(options: ChatRunOptions<'_>) -> Result<()> {
    let mut transport = if options.websocket {
        let url = ws_url(options.server)?;
        let mut policy = ReconnectPolicy::default();
        let client = WsChatClient::connect_with_backoff(&url, &mut policy).await?;
        Transport::Ws {
            client,
            url,
            policy,
        }
    } else {
        Transport::Sse(SseChatClient::new(chat_stream_url(
            options.server,
            options.base_path,
        )?))
    };

    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt, "/quit" | "/exit") {
            break;
        }

        conversation.push_user(prompt);
        let input = ChatInput::History(conversation.to_chat_history());

        match &mut transport {
            Transport::Sse(client) => {
                let request = ChatRequest {
                    message: Some(input),
                    options: options.options.clone(),
                };
                sse_turn(client, &request, &mut conversation).await;
            }
            Transport::Ws {
                client,
                url,
                policy,
            } => {
                let delivered = ws_turn(client, input, &options.options, &mut conversation).await;
                if !delivered {
                    *client = WsChatClient::connect_with_backoff(url, policy).await?;
                }
            }
        }
    }

    if let Transport::Ws { client, .. } = transport {
        let _ = client.close().await;
    }
    Ok(())
}

async fn sse_turn(client: &SseChatClient, request: &ChatRequest, conversation: &mut Conversation) {
    let mut frames = match client.send(request).await {
        Ok(frames) => frames,
        Err(e) => {
            let message = format!("{e:#}");
            print_error(&message);
            conversation.connection_lost(message);
            return;
        }
    };

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => {
                render(&frame);
                conversation.apply(frame);
            }
            Err(e) => {
                print_error(&e.to_string());
                conversation.connection_lost(e.to_string());
            }
        }
    }
}

/// Runs one turn over the socket. Returns `false` when the connection dropped.
async fn ws_turn(
    client: &mut WsChatClient,
    input: ChatInput,
    options: &GenerationOptions,
    conversation: &mut Conversation,
) -> bool {
    if let Err(e) = client.send_chat(input, options.clone()).await {
        tracing::warn!(error = %e, "send failed");
        print_error(CONNECTION_LOST);
        conversation.connection_lost(CONNECTION_LOST);
        return false;
    }

    loop {
        match client.next_event().await {
            Some(WsEvent::Frame(frame)) => {
                render(&frame);
                match conversation.apply(frame) {
                    FrameOutcome::Completed { .. } | FrameOutcome::Failed(_) => return true,
                    _ => {}
                }
            }
            Some(WsEvent::Error(e)) => {
                tracing::warn!(error = %e, "websocket error");
                print_error(CONNECTION_LOST);
                conversation.connection_lost(CONNECTION_LOST);
                return false;
            }
            Some(WsEvent::Disconnected) | None => {
                print_error(CONNECTION_LOST);
                conversation.connection_lost(CONNECTION_LOST);
                return false;
            }
        }
    }
}

fn render(frame: &ServerFrame) {
    let mut out = std::io::stdout().lock();
    let _ = match frame {
        ServerFrame::Event(event) => render_event(&mut out, event),
        ServerFrame::End => writeln!(out),
        ServerFrame::Error(message) => writeln!(out, "\nerror: {message}"),
        ServerFrame::Start | ServerFrame::ToolsList(_) => Ok(()),
    };
    let _ = out.flush();
}

fn render_event(out: &mut impl Write, event: &StreamEvent) -> std::io::Result<()> {
    match event {
        StreamEvent::ThinkingStart => write!(out, "[thinking] "),
        StreamEvent::ThinkingDelta { content } | StreamEvent::TextDelta { content } => {
            write!(out, "{content}")
        }
        StreamEvent::ResponseStart => writeln!(out),
        StreamEvent::ToolResult { tool, result, .. } => writeln!(out, "\n[{tool}] {result}"),
        StreamEvent::ToolError { tool, error } => writeln!(out, "\n[{tool}] error: {error}"),
        StreamEvent::WebSearchQuery { query } => writeln!(out, "\n[search] {query}"),
        StreamEvent::ContentBlockStart { .. }
        | StreamEvent::WebSearchStart { .. }
        | StreamEvent::WebSearchResult { .. }
        | StreamEvent::ContentBlockStop => Ok(()),
    }
}

fn print_error(message: &str) {
    eprintln!("error: {message}");
}
