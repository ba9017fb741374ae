//! Ordered provider fallback.
//!
//! A request walks its candidate list strictly one at a time:
//!
//! ```text
//!  Idle ─▶ SelectingCandidate ─▶ Calling ─┬─▶ Succeeded
//!              ▲                          │
//!              └──────── Advancing ◀──────┤ (empty / failure)
//!                                         └─▶ ExhaustedCandidates
//! ```
//!
//! Candidate order: the requested provider (if the catalog knows it), then the
//! working set, then the rest of the catalog, then one unpinned attempt.

use std::fmt;
use std::future::Future;
use std::iter;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::catalog::ProviderCatalog;
use crate::conversation::Conversation;
use crate::llm::{
    ChatRequest, ChatResponse, ChatStream, LLMError, LLMProvider, ProviderRegistry, StreamEvent,
    Usage,
};
use crate::probe::{ProviderHealthProbe, WorkingSet};
use crate::relay::StreamRelay;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Types
// ============================================================================

/// One entry of the fallback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// A catalog provider, called by id.
    Pinned(String),
    /// The provider client's own choice.
    Unpinned,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Pinned(id) => f.write_str(id),
            Candidate::Unpinned => f.write_str("<unpinned>"),
        }
    }
}

/// Result of a single candidate attempt.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    EmptyResponse,
    Failure(LLMError),
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::EmptyResponse => Outcome::EmptyResponse,
            Outcome::Failure(e) => Outcome::Failure(e),
        }
    }
}

/// A validated generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub conversation: Conversation,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub stream: bool,
}

impl GenerationRequest {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            provider: None,
            model: None,
            stream: false,
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// A successful blocking generation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub provider: Candidate,
    pub usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("all providers failed after {attempts} attempts: {}", describe_last_error(.last_error))]
    AllProvidersFailed {
        attempts: usize,
        last_error: Option<LLMError>,
    },
}

impl GenerateError {
    /// The error of the last candidate that failed, if any failed.
    pub fn last_error(&self) -> Option<&LLMError> {
        match self {
            GenerateError::AllProvidersFailed { last_error, .. } => last_error.as_ref(),
        }
    }
}

fn describe_last_error(last_error: &Option<LLMError>) -> String {
    match last_error {
        Some(e) => e.to_string(),
        None => "every provider returned an empty response".to_string(),
    }
}

/// Everything needed to call one candidate.
struct ProviderCall {
    handle: Arc<dyn LLMProvider>,
    request: ChatRequest,
    supports_stream: bool,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct CompletionOrchestrator {
    catalog: Arc<ProviderCatalog>,
    registry: ProviderRegistry,
    probe: Arc<ProviderHealthProbe>,
    default_model: String,
    attempt_timeout: Duration,
    idle_timeout: Duration,
}

impl CompletionOrchestrator {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        registry: ProviderRegistry,
        probe: Arc<ProviderHealthProbe>,
    ) -> Self {
        Self {
            catalog,
            registry,
            probe,
            default_model: DEFAULT_MODEL.to_string(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Time budget for each candidate, not the whole chain.
    #[must_use]
    pub fn with_attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = limit;
        self
    }

    /// Longest gap allowed between streamed fragments.
    #[must_use]
    pub fn with_idle_timeout(mut self, limit: Duration) -> Self {
        self.idle_timeout = limit;
        self
    }

    /// Generate a complete response, falling back across candidates.
    pub async fn generate(&self, request: GenerationRequest) -> Result<Completion, GenerateError> {
        let limit = self.attempt_timeout;
        let (provider, response) = self
            .run_chain(&request, move |call| complete(call, limit))
            .await?;

        Ok(Completion {
            content: response.content().to_string(),
            provider,
            usage: response.usage,
        })
    }

    /// Start a streamed response on the first candidate that accepts it.
    ///
    /// Once a candidate starts streaming the request is committed to it; later
    /// failures surface through the returned relay, not through fallback.
    pub async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<StreamRelay, GenerateError> {
        let limit = self.attempt_timeout;
        let (provider, stream) = self
            .run_chain(&request, move |call| open_stream(call, limit))
            .await?;

        Ok(StreamRelay::new(provider.to_string(), stream, self.idle_timeout))
    }

    /// Candidate order for a request against the current working set.
    pub async fn candidates(&self, provider_override: Option<&str>) -> Vec<Candidate> {
        let working = self.probe.snapshot().await;
        candidate_order(&self.catalog, &working, provider_override)
    }

    fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(id) if self.catalog.model(id).is_some() => id.to_string(),
            Some(id) => {
                debug!(model = %id, "Ignoring unknown model override");
                self.default_model.clone()
            }
            None => self.default_model.clone(),
        }
    }

    async fn run_chain<T, F, Fut>(
        &self,
        request: &GenerationRequest,
        call: F,
    ) -> Result<(Candidate, T), GenerateError>
    where
        F: Fn(ProviderCall) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let candidates = self.candidates(request.provider.as_deref()).await;
        let model = self.resolve_model(request.model.as_deref());
        let attempts = candidates.len();
        let mut last_error = None;

        for (index, candidate) in candidates.into_iter().enumerate() {
            let attempt = index + 1;
            debug!(provider = %candidate, attempt, model = %model, "Calling candidate");

            let outcome = match self.prepare(&candidate, &model, &request.conversation) {
                Ok(provider_call) => call(provider_call).await,
                Err(e) => Outcome::Failure(e),
            };

            match outcome {
                Outcome::Success(value) => {
                    info!(provider = %candidate, attempt, stream = request.stream, "Generation succeeded");
                    return Ok((candidate, value));
                }
                Outcome::EmptyResponse => {
                    warn!(provider = %candidate, attempt, "Empty response, advancing");
                }
                Outcome::Failure(e) => {
                    warn!(provider = %candidate, attempt, error = %e, "Provider failed, advancing");
                    last_error = Some(e);
                }
            }
        }

        error!(attempts, "All providers failed");
        Err(GenerateError::AllProvidersFailed {
            attempts,
            last_error,
        })
    }

    fn prepare(
        &self,
        candidate: &Candidate,
        model: &str,
        conversation: &Conversation,
    ) -> Result<ProviderCall, LLMError> {
        let (handle, descriptor) = match candidate {
            Candidate::Pinned(id) => (
                self.registry
                    .get(id)
                    .ok_or_else(|| LLMError::NotConfigured(id.clone()))?,
                self.catalog.lookup(id),
            ),
            Candidate::Unpinned => (
                self.registry
                    .unpinned()
                    .ok_or_else(|| LLMError::NotConfigured(candidate.to_string()))?,
                None,
            ),
        };

        let messages = match descriptor {
            Some(d) if !d.supports_system_message => conversation.without_system_role(),
            _ => conversation.messages().to_vec(),
        };

        Ok(ProviderCall {
            handle,
            request: ChatRequest::new(model, messages),
            supports_stream: descriptor.is_none_or(|d| d.supports_stream),
        })
    }
}

/// Build the fallback order. Ids the catalog does not know are skipped.
pub fn candidate_order(
    catalog: &ProviderCatalog,
    working: &WorkingSet,
    provider_override: Option<&str>,
) -> Vec<Candidate> {
    let mut ids: Vec<&str> = Vec::with_capacity(catalog.providers().len());

    if let Some(id) = provider_override {
        if catalog.lookup(id).is_some() {
            ids.push(id);
        } else {
            debug!(provider = %id, "Ignoring unknown provider override");
        }
    }

    let working_ids = working.providers().iter().map(String::as_str);
    let catalog_ids = catalog.providers().iter().map(|p| p.id.as_str());
    for id in working_ids.chain(catalog_ids) {
        if !ids.contains(&id) && catalog.lookup(id).is_some() {
            ids.push(id);
        }
    }

    ids.into_iter()
        .map(|id| Candidate::Pinned(id.to_string()))
        .chain(iter::once(Candidate::Unpinned))
        .collect()
}

async fn complete(call: ProviderCall, limit: Duration) -> Outcome<ChatResponse> {
    match timeout(limit, call.handle.chat(call.request)).await {
        Err(_) => Outcome::Failure(LLMError::Timeout(limit)),
        Ok(Err(e)) => Outcome::Failure(e),
        Ok(Ok(response)) if response.content().trim().is_empty() => Outcome::EmptyResponse,
        Ok(Ok(response)) => Outcome::Success(response),
    }
}

async fn open_stream(call: ProviderCall, limit: Duration) -> Outcome<ChatStream> {
    if !call.supports_stream {
        return complete(call, limit).await.map(single_fragment);
    }

    match timeout(limit, call.handle.chat_stream(call.request)).await {
        Err(_) => Outcome::Failure(LLMError::Timeout(limit)),
        Ok(Err(e)) => Outcome::Failure(e),
        Ok(Ok(stream)) => Outcome::Success(stream),
    }
}

/// Present a blocking response as a one-fragment stream.
fn single_fragment(response: ChatResponse) -> ChatStream {
    let content = response.content().to_string();
    let events: [Result<StreamEvent, LLMError>; 2] = [
        Ok(StreamEvent::Token(content)),
        Ok(StreamEvent::Done {
            usage: response.usage,
        }),
    ];
    Box::pin(futures::stream::iter(events))
}
