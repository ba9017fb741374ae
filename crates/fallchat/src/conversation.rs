//! Inbound message validation.
//!
//! Messages with a blank role or blank content are dropped; roles are
//! lower-cased. A conversation that is empty after filtering is rejected.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::llm::Message;

/// A message as sent by the client, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub role: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No messages provided")]
    NoMessages,

    #[error("Invalid message format")]
    NoValidMessages,
}

/// An ordered, non-empty list of validated messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation(Vec<Message>);

impl Conversation {
    pub fn from_inbound(messages: Vec<InboundMessage>) -> Result<Self, ValidationError> {
        if messages.is_empty() {
            return Err(ValidationError::NoMessages);
        }
        let total = messages.len();
        let valid: Vec<Message> = messages.into_iter().filter_map(normalize).collect();
        if valid.len() < total {
            debug!(dropped = total - valid.len(), "Dropped invalid messages");
        }
        if valid.is_empty() {
            return Err(ValidationError::NoValidMessages);
        }
        Ok(Self(valid))
    }

    /// Validate already-typed messages with the same rules as inbound ones.
    pub fn new(messages: Vec<Message>) -> Result<Self, ValidationError> {
        Self::from_inbound(
            messages
                .into_iter()
                .map(|m| InboundMessage {
                    role: Some(Value::String(m.role)),
                    content: Some(Value::String(m.content)),
                })
                .collect(),
        )
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    /// Copy of the messages with system turns re-sent as user turns, for
    /// providers that reject the system role.
    pub fn without_system_role(&self) -> Vec<Message> {
        self.0
            .iter()
            .map(|m| {
                if m.is_system() {
                    Message::user(m.content.clone())
                } else {
                    m.clone()
                }
            })
            .collect()
    }
}

fn normalize(message: InboundMessage) -> Option<Message> {
    let role = match message.role? {
        Value::String(s) => s.trim().to_lowercase(),
        _ => return None,
    };
    let content = match message.content? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if role.is_empty() || content.trim().is_empty() {
        return None;
    }
    Some(Message { role, content })
}
