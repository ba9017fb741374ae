//! Active provider health checks.
//!
//! A probe sends one short completion request to every catalog provider and
//! publishes the providers that answered as the new [`WorkingSet`]. Each probe
//! builds its set off to the side and swaps it in with a single write, so a
//! reader holds either the previous set or the next one, never a mix.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::catalog::ProviderCatalog;
use crate::llm::{ChatRequest, Message, ProviderRegistry};

/// Providers believed functional, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSet {
    providers: Vec<String>,
    probed_at: Option<DateTime<Utc>>,
}

impl WorkingSet {
    pub fn new(providers: Vec<String>, probed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            providers,
            probed_at,
        }
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// When the probe that produced this set finished; `None` before the first probe.
    pub fn probed_at(&self) -> Option<DateTime<Utc>> {
        self.probed_at
    }
}

pub struct ProviderHealthProbe {
    catalog: Arc<ProviderCatalog>,
    registry: ProviderRegistry,
    model: String,
    message: String,
    timeout: Duration,
    current: RwLock<Arc<WorkingSet>>,
    refresh: Mutex<()>,
}

impl ProviderHealthProbe {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        registry: ProviderRegistry,
        model: impl Into<String>,
        message: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            registry,
            model: model.into(),
            message: message.into(),
            timeout,
            current: RwLock::new(Arc::new(WorkingSet::default())),
            refresh: Mutex::new(()),
        }
    }

    /// The most recently published working set.
    pub async fn snapshot(&self) -> Arc<WorkingSet> {
        Arc::clone(&*self.current.read().await)
    }

    /// Probe every catalog provider and publish the result.
    ///
    /// Overlapping calls run one after another; each publishes a complete set.
    pub async fn probe(&self) -> Arc<WorkingSet> {
        let _guard = self.refresh.lock().await;

        let providers = self.catalog.providers();
        let results = join_all(providers.iter().map(|p| self.check(&p.id))).await;

        let working: Vec<String> = providers
            .iter()
            .zip(results)
            .filter(|(_, ok)| *ok)
            .map(|(p, _)| p.id.clone())
            .collect();

        let set = Arc::new(WorkingSet::new(working, Some(Utc::now())));
        *self.current.write().await = Arc::clone(&set);

        info!(
            working = set.len(),
            total = providers.len(),
            providers = ?set.providers(),
            "Provider probe complete"
        );
        set
    }

    async fn check(&self, id: &str) -> bool {
        let Some(provider) = self.registry.get(id) else {
            warn!(provider = %id, "Excluding provider: no client configured");
            return false;
        };

        let request = ChatRequest::new(self.model.clone(), vec![Message::user(self.message.clone())]);

        match timeout(self.timeout, provider.chat(request)).await {
            Ok(Ok(response)) if !response.content().trim().is_empty() => {
                debug!(provider = %id, "Provider probe succeeded");
                true
            }
            Ok(Ok(_)) => {
                warn!(provider = %id, "Excluding provider: empty probe response");
                false
            }
            Ok(Err(e)) => {
                warn!(provider = %id, error = %e, "Excluding provider: probe failed");
                false
            }
            Err(_) => {
                warn!(
                    provider = %id,
                    timeout_secs = self.timeout.as_secs(),
                    "Excluding provider: probe timed out"
                );
                false
            }
        }
    }
}
