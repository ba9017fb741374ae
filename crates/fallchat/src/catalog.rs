//! Static registry of known providers and models.
//!
//! Built once at startup from configuration and never mutated. Lookups of
//! unknown ids return `None`; callers treat that as "no valid override".

use std::collections::HashSet;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::warn;

use crate::config::{ModelConfig, ProviderConfig};

/// Description of one upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: String,
    /// Static hint from configuration; live health comes from the probe.
    pub working: bool,
    pub supports_stream: bool,
    pub supports_system_message: bool,
    pub url: String,
}

impl From<&ProviderConfig> for ProviderDescriptor {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            working: config.working,
            supports_stream: config.supports_stream,
            supports_system_message: config.supports_system_message,
            url: config.url.clone(),
        }
    }
}

/// Description of one model id clients may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub base_provider: String,
    pub best_provider: String,
}

impl From<&ModelConfig> for ModelDescriptor {
    fn from(config: &ModelConfig) -> Self {
        let display_name = if config.display_name.trim().is_empty() {
            config.id.clone()
        } else {
            config.display_name.clone()
        };
        Self {
            id: config.id.clone(),
            display_name,
            base_provider: config.base_provider.clone(),
            best_provider: config.best_provider.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    providers: Vec<ProviderDescriptor>,
    models: Vec<ModelDescriptor>,
}

impl ProviderCatalog {
    /// Build the catalog, keeping the first entry for any duplicated id.
    pub fn new(providers: Vec<ProviderDescriptor>, models: Vec<ModelDescriptor>) -> Self {
        Self {
            providers: dedup_by_id(providers, provider_id, "provider"),
            models: dedup_by_id(models, model_id, "model"),
        }
    }

    pub fn from_config(providers: &[ProviderConfig], models: &[ModelConfig]) -> Self {
        Self::new(
            providers.iter().map(ProviderDescriptor::from).collect(),
            models.iter().map(ModelDescriptor::from).collect(),
        )
    }

    pub fn lookup(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn model(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Providers in catalog order.
    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// Models in catalog order.
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Serializable `id -> descriptor` view of the providers, in catalog order.
    pub fn providers_by_id(&self) -> ById<'_, ProviderDescriptor> {
        ById {
            items: &self.providers,
            id: provider_id,
        }
    }

    /// Serializable `id -> descriptor` view of the models, in catalog order.
    pub fn models_by_id(&self) -> ById<'_, ModelDescriptor> {
        ById {
            items: &self.models,
            id: model_id,
        }
    }
}

/// Serializes a slice as a JSON object keyed by id, preserving slice order.
pub struct ById<'a, T> {
    items: &'a [T],
    id: fn(&T) -> &String,
}

impl<T: Serialize> Serialize for ById<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for item in self.items {
            map.serialize_entry((self.id)(item), item)?;
        }
        map.end()
    }
}

fn provider_id(provider: &ProviderDescriptor) -> &String {
    &provider.id
}

fn model_id(model: &ModelDescriptor) -> &String {
    &model.id
}

fn dedup_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &String, kind: &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(id(item).clone());
            if !fresh {
                warn!(kind, id = %id(item), "Ignoring duplicate catalog entry");
            }
            fresh
        })
        .collect()
}
