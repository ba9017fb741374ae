//! Fallchat - chat completion with ordered fallback across OpenAI-compatible providers.

pub mod catalog;
pub mod config;
pub mod conversation;
pub mod handlers;
pub mod llm;
pub mod orchestrator;
pub mod probe;
pub mod relay;
pub mod response;
pub mod server;

#[cfg(test)]
mod testing;
