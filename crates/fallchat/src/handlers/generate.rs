//! Chat generation handler.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::{CACHE_CONTROL, HeaderName};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info_span};
use ulid::Ulid;

use crate::conversation::{Conversation, InboundMessage};
use crate::orchestrator::GenerationRequest;
use crate::relay::RelayEvent;
use crate::response;
use crate::server::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    messages: Vec<InboundMessage>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stream: Option<bool>,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ContentData {
    content: String,
}

#[derive(Serialize)]
struct DoneData {
    done: bool,
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

// ============================================================================
// Handler
// ============================================================================

/// POST /api/generate
/// Request body: `{"messages": [{"role": "...", "content": "..."}], "provider"?, "model"?, "stream"?}`
///
/// With `stream: true` the response is a data-only event stream:
/// - `{"content": "..."}` per fragment
/// - `{"done": true}` after the last fragment
/// - `{"error": "..."}` if the stream fails or nothing could be generated
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected generate body");
            return response::bad_request(format!("Invalid request body: {}", rejection.body_text()))
                .into_response();
        }
    };

    let conversation = match Conversation::from_inbound(body.messages) {
        Ok(conversation) => conversation,
        Err(e) => return response::bad_request(e.to_string()).into_response(),
    };

    let request = GenerationRequest {
        conversation,
        provider: body.provider,
        model: body.model,
        stream: body.stream.unwrap_or(false),
    };

    let span = info_span!("generate", request_id = %Ulid::new(), stream = request.stream);

    if request.stream {
        stream_response(state, request).instrument(span).await
    } else {
        blocking_response(state, request).instrument(span).await
    }
}

async fn blocking_response(state: AppState, request: GenerationRequest) -> Response {
    match state.orchestrator.generate(request).await {
        Ok(completion) => (
            StatusCode::OK,
            Json(GenerateResponse {
                response: completion.content,
            }),
        )
            .into_response(),
        Err(e) => response::internal_error(format!("Generation failed: {e}")).into_response(),
    }
}

async fn stream_response(state: AppState, request: GenerationRequest) -> Response {
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    match state.orchestrator.generate_stream(request).await {
        Ok(relay) => event_stream(relay.map(to_event), keep_alive),
        Err(e) => {
            let event = error_event(format!("Generation failed: {e}"));
            event_stream(stream::once(async move { event }), keep_alive)
        }
    }
}

fn event_stream<S>(events: S, keep_alive: KeepAlive) -> Response
where
    S: Stream<Item = Event> + Send + 'static,
{
    let sse = Sse::new(events.map(Ok::<_, Infallible>)).keep_alive(keep_alive);
    (
        [
            (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (X_ACCEL_BUFFERING, HeaderValue::from_static("no")),
        ],
        sse,
    )
        .into_response()
}

fn to_event(event: RelayEvent) -> Event {
    match event {
        RelayEvent::Content(content) => Event::default()
            .json_data(ContentData { content })
            .unwrap_or_else(|_| Event::default().data("{}")),
        RelayEvent::Done => Event::default()
            .json_data(DoneData { done: true })
            .unwrap_or_else(|_| Event::default().data(r#"{"done":true}"#)),
        RelayEvent::Error(message) => error_event(message),
    }
}

fn error_event(error: String) -> Event {
    Event::default()
        .json_data(ErrorData { error })
        .unwrap_or_else(|_| Event::default().data(r#"{"error":"stream failed"}"#))
}
