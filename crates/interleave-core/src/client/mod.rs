//! Chat clients that drive the reassembler from a live server.

pub mod sse;
pub mod ws;

use anyhow::{Context, Result, bail};
use url::Url;

pub use sse::{CONNECTION_LOST, FrameStream, SseChatClient};
pub use ws::{WsChatClient, WsEvent};

/// `{server}{base_path}/chat/stream`.
///
/// # Errors
/// Returns an error if `server` is not an http(s) URL.
pub fn chat_stream_url(server: &str, base_path: &str) -> Result<Url> {
    let url = parse_http(server)?;
    let path = format!(
        "{}/{}/chat/stream",
        url.path().trim_end_matches('/'),
        base_path.trim_matches('/')
    )
    .replace("//", "/");
    let mut url = url;
    url.set_path(&path);
    Ok(url)
}

/// The server's `/ws` endpoint with the scheme switched to ws(s).
///
/// # Errors
/// Returns an error if `server` is not an http(s) URL.
pub fn ws_url(server: &str) -> Result<Url> {
    let url = parse_http(server)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    let rebuilt = format!(
        "{scheme}://{}/ws",
        url[url::Position::BeforeHost..url::Position::AfterPort].trim_end_matches('/')
    );
    Url::parse(&rebuilt).with_context(|| format!("Invalid websocket URL: {rebuilt}"))
}

fn parse_http(server: &str) -> Result<Url> {
    let url = Url::parse(server.trim()).with_context(|| format!("Invalid server URL: {server}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Server URL must be http or https: {server}");
    }
    Ok(url)
}
