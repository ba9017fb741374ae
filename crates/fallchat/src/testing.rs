//! Scripted providers for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::{ProviderCatalog, ProviderDescriptor};
use crate::llm::{
    ChatRequest, ChatResponse, ChatStream, LLMError, LLMProvider, ProviderRegistry, StreamEvent,
};

#[derive(Clone)]
pub enum Behavior {
    Reply(String),
    Empty,
    Fail(String),
    /// Streams these fragments; a blocking call returns them joined.
    Fragments(Vec<String>),
    /// Streams these fragments, then fails.
    BreakAfter(Vec<String>, String),
    /// Replies to the first call only; every later call fails.
    ReplyOnce(String),
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub provider: String,
    pub stream: bool,
    pub request: ChatRequestRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequestRecord {
    pub model: String,
    pub roles: Vec<String>,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub struct StubProvider {
    name: String,
    behavior: Behavior,
    log: CallLog,
}

impl StubProvider {
    pub fn new(name: &str, behavior: Behavior, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            log: Arc::clone(log),
        })
    }

    /// Log the call and return how many earlier calls this provider saw.
    fn record(&self, request: &ChatRequest, stream: bool) -> usize {
        let mut log = self.log.lock().unwrap();
        let earlier = log.iter().filter(|c| c.provider == self.name).count();
        log.push(Call {
            provider: self.name.clone(),
            stream,
            request: ChatRequestRecord {
                model: request.model.clone(),
                roles: request.messages.iter().map(|m| m.role.clone()).collect(),
            },
        });
        earlier
    }
}

fn events(fragments: &[String], tail: Option<LLMError>) -> ChatStream {
    let mut items: Vec<Result<StreamEvent, LLMError>> = fragments
        .iter()
        .map(|f| Ok(StreamEvent::Token(f.clone())))
        .collect();
    match tail {
        Some(err) => items.push(Err(err)),
        None => items.push(Ok(StreamEvent::Done { usage: None })),
    }
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl LLMProvider for StubProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let earlier = self.record(&request, false);
        match &self.behavior {
            Behavior::Reply(text) => Ok(ChatResponse::assistant(text.clone())),
            Behavior::Empty => Ok(ChatResponse::assistant("  \n")),
            Behavior::Fail(msg) => Err(LLMError::Other(msg.clone())),
            Behavior::Fragments(f) => Ok(ChatResponse::assistant(f.concat())),
            Behavior::BreakAfter(_, msg) => Err(LLMError::Other(msg.clone())),
            Behavior::ReplyOnce(text) if earlier == 0 => Ok(ChatResponse::assistant(text.clone())),
            Behavior::ReplyOnce(_) => Err(LLMError::Other(format!("{} went down", self.name))),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ChatResponse::assistant("too late"))
            }
        }
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let earlier = self.record(&request, true);
        match &self.behavior {
            Behavior::Reply(text) => Ok(events(std::slice::from_ref(text), None)),
            Behavior::Empty => Ok(events(&[], None)),
            Behavior::Fail(msg) => Err(LLMError::Other(msg.clone())),
            Behavior::Fragments(f) => Ok(events(f, None)),
            Behavior::BreakAfter(f, msg) => Ok(events(f, Some(LLMError::Other(msg.clone())))),
            Behavior::ReplyOnce(text) if earlier == 0 => Ok(events(std::slice::from_ref(text), None)),
            Behavior::ReplyOnce(_) => Err(LLMError::Other(format!("{} went down", self.name))),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(events(&[], None))
            }
        }
    }
}

pub fn descriptor(id: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        id: id.to_string(),
        working: true,
        supports_stream: true,
        supports_system_message: true,
        url: format!("https://{}.invalid/v1", id.to_lowercase()),
    }
}

/// Catalog and registry for `(id, behavior)` pairs, in the given order.
pub fn fixture(
    providers: &[(&str, Behavior)],
    unpinned: Option<Behavior>,
) -> (Arc<ProviderCatalog>, ProviderRegistry, CallLog) {
    let log = CallLog::default();
    let mut registry = ProviderRegistry::new();
    let mut descriptors = Vec::new();
    for (id, behavior) in providers {
        registry.register(*id, StubProvider::new(id, behavior.clone(), &log));
        descriptors.push(descriptor(id));
    }
    if let Some(behavior) = unpinned {
        registry.set_unpinned(StubProvider::new("<unpinned>", behavior, &log));
    }
    (
        Arc::new(ProviderCatalog::new(descriptors, Vec::new())),
        registry,
        log,
    )
}

pub fn called(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|c| c.provider.clone()).collect()
}

pub fn reply(text: &str) -> Behavior {
    Behavior::Reply(text.to_string())
}

pub fn fail(msg: &str) -> Behavior {
    Behavior::Fail(msg.to_string())
}

pub fn fragments(parts: &[&str]) -> Behavior {
    Behavior::Fragments(parts.iter().map(|p| p.to_string()).collect())
}
