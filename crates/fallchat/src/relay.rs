//! Adapter from a provider's fragment stream to the outward event protocol.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::llm::{ChatStream, LLMError, StreamEvent};

/// Message sent when a provider finishes without producing any text.
pub const EMPTY_STREAM_MESSAGE: &str = "provider returned an empty response";

/// One outward streaming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A non-empty text fragment, in provider order.
    Content(String),
    /// Terminal: at least one fragment was relayed.
    Done,
    /// Terminal: the stream failed, stalled, or produced nothing.
    Error(String),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Content(_))
    }
}

/// Flattens provider errors and idle timeouts into one error type.
enum RelayError {
    Llm(LLMError),
    Idle(Duration),
}

type FlattenedStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RelayError>> + Send>>;

/// Relays one committed provider stream.
///
/// Emits a [`RelayEvent::Content`] per non-empty fragment followed by exactly
/// one terminal event. Dropping the relay drops the provider stream with it.
pub struct StreamRelay {
    inner: FlattenedStream,
    provider: String,
    fragments: usize,
    finished: bool,
}

impl StreamRelay {
    pub fn new(provider: impl Into<String>, inner: ChatStream, idle_timeout: Duration) -> Self {
        let timed = inner.timeout(idle_timeout);
        let flattened = StreamExt::map(timed, move |result| match result {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(e)) => Err(RelayError::Llm(e)),
            Err(_elapsed) => Err(RelayError::Idle(idle_timeout)),
        });

        Self {
            inner: Box::pin(flattened),
            provider: provider.into(),
            fragments: 0,
            finished: false,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn finish(&mut self) -> RelayEvent {
        self.finished = true;
        if self.fragments > 0 {
            debug!(provider = %self.provider, fragments = self.fragments, "Stream complete");
            RelayEvent::Done
        } else {
            warn!(provider = %self.provider, "Stream ended without content");
            RelayEvent::Error(EMPTY_STREAM_MESSAGE.to_string())
        }
    }

    fn fail(&mut self, message: String) -> RelayEvent {
        self.finished = true;
        warn!(
            provider = %self.provider,
            fragments = self.fragments,
            error = %message,
            "Stream failed"
        );
        RelayEvent::Error(message)
    }
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                provider = %self.provider,
                fragments = self.fragments,
                "Client went away mid-stream; releasing provider stream"
            );
        }
    }
}

impl Stream for StreamRelay {
    type Item = RelayEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(StreamEvent::Token(text)))) => {
                    if text.is_empty() {
                        continue;
                    }
                    self.fragments += 1;
                    return Poll::Ready(Some(RelayEvent::Content(text)));
                }
                Poll::Ready(Some(Ok(StreamEvent::Done { .. }))) | Poll::Ready(None) => {
                    return Poll::Ready(Some(self.finish()));
                }
                Poll::Ready(Some(Err(RelayError::Llm(e)))) => {
                    return Poll::Ready(Some(self.fail(e.to_string())));
                }
                Poll::Ready(Some(Err(RelayError::Idle(limit)))) => {
                    let message = format!("stream idle for more than {}s", limit.as_secs());
                    return Poll::Ready(Some(self.fail(message)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
