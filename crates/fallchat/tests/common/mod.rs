//! Shared helpers for HTTP tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use fallchat::catalog::{ModelDescriptor, ProviderCatalog, ProviderDescriptor};
use fallchat::config::Config;
use fallchat::llm::{ChatRequest, ChatResponse, ChatStream, LLMError, LLMProvider, ProviderRegistry, StreamEvent};
use fallchat::server::{AppState, build_app};

/// A provider that always behaves the same way.
#[derive(Clone)]
pub enum Stub {
    Reply(&'static str),
    Fragments(&'static [&'static str]),
    Fail(&'static str),
}

#[async_trait]
impl LLMProvider for Stub {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
        match self {
            Stub::Reply(text) => Ok(ChatResponse::assistant(*text)),
            Stub::Fragments(parts) => Ok(ChatResponse::assistant(parts.concat())),
            Stub::Fail(msg) => Err(LLMError::Other(msg.to_string())),
        }
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
        let parts: Vec<&str> = match self {
            Stub::Reply(text) => vec![*text],
            Stub::Fragments(parts) => parts.to_vec(),
            Stub::Fail(msg) => return Err(LLMError::Other(msg.to_string())),
        };
        let events = parts
            .into_iter()
            .map(|p| Ok::<_, LLMError>(StreamEvent::Token(p.to_string())))
            .chain(std::iter::once(Ok(StreamEvent::Done { usage: None })));
        Ok(Box::pin(futures::stream::iter(events.collect::<Vec<_>>())))
    }
}

fn descriptor(id: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        id: id.to_string(),
        working: true,
        supports_stream: true,
        supports_system_message: true,
        url: format!("https://{}.invalid/v1", id.to_lowercase()),
    }
}

fn model(id: &str, base: &str) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        base_provider: base.to_string(),
        best_provider: String::new(),
    }
}

/// App state over stub providers, plus an optional unpinned stub.
pub fn state(providers: &[(&str, Stub)], unpinned: Option<Stub>) -> AppState {
    let mut registry = ProviderRegistry::new();
    for (id, stub) in providers {
        registry.register(*id, Arc::new(stub.clone()));
    }
    if let Some(stub) = unpinned {
        registry.set_unpinned(Arc::new(stub));
    }

    let catalog = ProviderCatalog::new(
        providers.iter().map(|(id, _)| descriptor(id)).collect(),
        vec![model("gpt-3.5-turbo", "openai"), model("gpt-4", "openai")],
    );

    AppState::new(&Config::default(), catalog, registry)
}

pub fn app(state: AppState) -> Router {
    build_app(state, 30)
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Parse the JSON payloads of `data:` lines, skipping keep-alive comments.
pub fn sse_payloads(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}
