//! Provider registry for managing LLM provider instances.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use super::openai::OpenAICompatibleProvider;
use super::provider::LLMProvider;
use crate::config::{Config, EndpointConfig};

/// Registry of LLM provider handles, keyed by catalog provider id.
///
/// Built once at startup. A lookup miss is the only failure mode for an
/// unknown id. The optional unpinned handle serves requests that do not name
/// a provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    unpinned: Option<Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build OpenAI-compatible handles for every configured provider.
    pub fn from_config(config: &Config, client: Client) -> Self {
        let mut registry = Self::new();

        for provider in &config.providers {
            if registry.contains(&provider.id) {
                continue;
            }
            let api_key = resolve_api_key(&provider.id, provider.api_key_env.as_deref());
            let handle = OpenAICompatibleProvider::new(client.clone(), provider.url.clone(), api_key);
            registry.register(provider.id.clone(), Arc::new(handle));
        }

        if let Some(EndpointConfig { url, api_key_env }) = &config.fallback.unpinned {
            let api_key = resolve_api_key("unpinned", api_key_env.as_deref());
            let handle = OpenAICompatibleProvider::new(client, url.clone(), api_key);
            registry.set_unpinned(Arc::new(handle));
            info!(url = %url, "Registered unpinned provider");
        } else {
            warn!("No unpinned provider configured; the trailing fallback attempt will fail");
        }

        info!(count = registry.len(), "Registered providers");
        registry
    }

    /// Register a provider implementation.
    pub fn register(&mut self, id: impl Into<String>, implementation: Arc<dyn LLMProvider>) {
        self.providers.insert(id.into(), implementation);
    }

    /// Set the handle used when no provider is named.
    pub fn set_unpinned(&mut self, implementation: Arc<dyn LLMProvider>) {
        self.unpinned = Some(implementation);
    }

    /// Get a provider by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn unpinned(&self) -> Option<Arc<dyn LLMProvider>> {
        self.unpinned.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn resolve_api_key(id: &str, env_var: Option<&str>) -> Option<String> {
    let name = env_var?;
    match std::env::var(name) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => {
            warn!(provider = %id, env = %name, "API key environment variable not set");
            None
        }
    }
}
