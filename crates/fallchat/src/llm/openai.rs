//! OpenAI-compatible LLM provider.
//!
//! Works with OpenAI, OpenRouter, Groq, DeepInfra, Ollama, and other compatible APIs.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;

use super::error::{LLMError, check_response_error};
use super::provider::LLMProvider;
use super::types::{ChatRequest, ChatResponse, ChatStream, Message, StreamEvent, Usage};

/// OpenAI-compatible provider.
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    #[must_use]
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn build_request<T: serde::Serialize>(&self, body: &T) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        req.json(body)
    }

    async fn send<T: serde::Serialize>(&self, body: &T) -> Result<reqwest::Response, LLMError> {
        let response = self.build_request(body).send().await?;

        if let Some(err) = check_response_error(&response) {
            return Err(err);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let response = self.send(&request).await?;
        Ok(response.json().await?)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let stream_request = StreamRequest {
            model: request.model,
            messages: request.messages,
            stream: true,
        };

        let response = self.send(&stream_request).await?;
        let event_stream = StreamParser::new(response.bytes_stream());

        Ok(Box::pin(event_stream))
    }
}

// --- Streaming types ---

#[derive(serde::Serialize)]
struct StreamRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

/// Turns an SSE byte stream of `chat.completion.chunk` objects into [`StreamEvent`]s.
struct StreamParser<S> {
    inner: S,
    buffer: Vec<u8>,
    usage: Option<Usage>,
    done: bool,
}

impl<S> StreamParser<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            usage: None,
            done: false,
        }
    }
}

impl<S> Stream for StreamParser<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            if let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
                // Only whole lines are decoded; a chunk may end mid-character.
                let line = match std::str::from_utf8(&raw) {
                    Ok(line) => line.trim().to_string(),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping stream line with invalid UTF-8");
                        continue;
                    }
                };

                let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                    continue;
                };

                if data == "[DONE]" {
                    self.done = true;
                    let usage = self.usage.take();
                    return Poll::Ready(Some(Ok(StreamEvent::Done { usage })));
                }

                match serde_json::from_str::<StreamChunk>(data) {
                    Ok(chunk) => {
                        if chunk.usage.is_some() {
                            self.usage = chunk.usage;
                        }
                        if let Some(choice) = chunk.choices.into_iter().next()
                            && let Some(content) = choice.delta.content
                            && !content.is_empty()
                        {
                            return Poll::Ready(Some(Ok(StreamEvent::Token(content))));
                        }
                    }
                    Err(e) => {
                        tracing::debug!(data = %data, error = %e, "failed to parse stream chunk");
                    }
                }
                continue;
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::Request(e))));
                }
                Poll::Ready(None) => {
                    // Flush a trailing line that arrived without a newline.
                    if !self.buffer.trim_ascii().is_empty() {
                        self.buffer.push(b'\n');
                        continue;
                    }
                    self.done = true;
                    let usage = self.usage.take();
                    return Poll::Ready(Some(Ok(StreamEvent::Done { usage })));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(serde::Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;

    fn parser(chunks: &[&str]) -> StreamParser<impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin> {
        let items: Vec<Result<Bytes, reqwest::Error>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        StreamParser::new(futures::stream::iter(items))
    }

    async fn tokens(chunks: &[&str]) -> (Vec<String>, bool) {
        let mut stream = parser(chunks);
        let mut tokens = Vec::new();
        let mut done = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Token(t) => tokens.push(t),
                StreamEvent::Done { .. } => done = true,
            }
        }
        (tokens, done)
    }

    #[tokio::test]
    async fn parses_deltas_until_done_marker() {
        let (tokens, done) = tokens(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(tokens, vec!["Hel", "lo"]);
        assert!(done);
    }

    #[tokio::test]
    async fn joins_lines_split_across_chunks() {
        let (tokens, _) = tokens(&[
            "data: {\"choices\":[{\"del",
            "ta\":{\"content\":\"x\"}}]}\n",
        ])
        .await;
        assert_eq!(tokens, vec!["x"]);
    }

    #[tokio::test]
    async fn keeps_characters_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"h\u{e9}llo \u{4e16}\u{754c}\"}}]}\n";
        let bytes = line.as_bytes();
        let split_e = line.find('\u{e9}').unwrap() + 1;
        let split_cjk = line.find('\u{4e16}').unwrap() + 2;

        let items: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split_e])),
            Ok(Bytes::copy_from_slice(&bytes[split_e..split_cjk])),
            Ok(Bytes::copy_from_slice(&bytes[split_cjk..])),
        ];
        let mut stream = StreamParser::new(futures::stream::iter(items));

        match stream.next().await.unwrap().unwrap() {
            StreamEvent::Token(t) => assert_eq!(t, "h\u{e9}llo \u{4e16}\u{754c}"),
            StreamEvent::Done { .. } => panic!("expected a token"),
        }
    }

    #[tokio::test]
    async fn skips_role_only_and_malformed_chunks() {
        let (tokens, done) = tokens(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: not json\n",
            ": keep-alive comment\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        ])
        .await;
        assert_eq!(tokens, vec!["ok"]);
        assert!(done, "end of body without [DONE] still finishes the stream");
    }

    #[tokio::test]
    async fn empty_body_yields_only_done() {
        let (tokens, done) = tokens(&[]).await;
        assert!(tokens.is_empty());
        assert!(done);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAICompatibleProvider::new(
            Client::new(),
            "http://localhost:11434/v1/".to_string(),
            None,
        );
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }
}
