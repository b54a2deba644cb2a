use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::Html;
use futures_util::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::core::chat_stream::{StreamMessage, StreamParams};
use crate::server::page;

#[derive(Deserialize)]
pub struct ChatParams {
    pub expert: Option<String>,
    pub q: Option<String>,
}

/// `q` is required and must be non-empty; `expert` defaults to `general`
/// (the registry degrades unknown keys gracefully, no validation needed).
fn validated(params: &ChatParams) -> Result<(String, String), (StatusCode, String)> {
    let query = params.q.as_deref().map(str::trim).unwrap_or("");
    if query.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "query parameter 'q' must not be empty".to_string(),
        ));
    }
    let expert = params
        .expert
        .clone()
        .unwrap_or_else(|| "general".to_string());
    Ok((expert, query.to_string()))
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(page::render(state.backend.registry()))
}

/// Blocking completion: the full assistant text as `text/plain`.
pub async fn chat(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
) -> Result<String, (StatusCode, String)> {
    let (expert, query) = validated(&params)?;

    state.backend.complete(&expert, &query).await.map_err(|e| {
        tracing::error!("blocking completion failed: {e}");
        (StatusCode::BAD_GATEWAY, e.to_string())
    })
}

/// Streaming completion over SSE. Each event carries one chunk, flushed as
/// soon as the backend produces it. A backend failure is framed as a
/// terminal event named `error`; either way the connection closes when the
/// chunk sequence ends. Dropping the response (client disconnect) cancels
/// the backend stream through the drop guard.
pub async fn chat_stream(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let (expert, query) = validated(&params)?;

    tracing::debug!(expert, "opening chat stream");
    let cancel_token = CancellationToken::new();
    let rx = state.backend.spawn_stream(StreamParams {
        expert,
        query,
        cancel_token: cancel_token.clone(),
        stream_id: 0,
    });

    let guard = cancel_token.drop_guard();
    let stream = UnboundedReceiverStream::new(rx).map_while(move |(message, _)| {
        let _cancel_on_drop = &guard;
        match message {
            StreamMessage::Chunk(content) => Some(Ok(Event::default().data(content))),
            StreamMessage::Error(detail) => Some(Ok(Event::default().event("error").data(detail))),
            StreamMessage::End => None,
        }
    });

    Ok(Sse::new(stream))
}

pub async fn health() -> &'static str {
    "OK"
}
