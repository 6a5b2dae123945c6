//! `POST {base}/chat/stream`: one turn as an SSE response.

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use interleave_core::core::TurnError;
use interleave_core::transport::ChatRequest;
use interleave_core::transport::frames::{MESSAGE_REQUIRED, ServerFrame};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let text = rejection.body_text();
            debug!(error = %text, "rejected chat body");
            return bad_request(&text);
        }
    };
    let Some(input) = request.message.filter(|m| !m.is_empty()) else {
        return bad_request(MESSAGE_REQUIRED);
    };

    let turn = state
        .agent()
        .start_turn(input.into_messages(), &request.options, CancellationToken::new());
    let turn_id = turn.id().to_string();
    info!(turn_id = %turn_id, "sse turn started");

    // Dropping the response (client gone) drops the turn and its provider stream.
    let stream = async_stream::stream! {
        yield frame_event(&ServerFrame::Start);

        let mut events = Box::pin(turn.into_stream());
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => yield frame_event(&ServerFrame::Event(event)),
                Err(TurnError::Cancelled) => return,
                Err(e) => {
                    yield frame_event(&ServerFrame::Error(e.user_message()));
                    return;
                }
            }
        }

        yield frame_event(&ServerFrame::End);
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn frame_event(frame: &ServerFrame) -> Result<Event, Infallible> {
    let data = frame.sse_data().unwrap_or_else(|e| {
        warn!(error = %e, "failed to encode frame");
        json!({ "error": "Failed to encode event" }).to_string()
    });
    Ok(Event::default().event(frame.sse_event_name()).data(data))
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
