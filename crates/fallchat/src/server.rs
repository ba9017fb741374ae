use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use reqwest::Client;
use tower_http::timeout::TimeoutLayer;

use crate::catalog::ProviderCatalog;
use crate::config::Config;
use crate::handlers;
use crate::llm::ProviderRegistry;
use crate::orchestrator::CompletionOrchestrator;
use crate::probe::ProviderHealthProbe;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ProviderCatalog>,
    pub probe: Arc<ProviderHealthProbe>,
    pub orchestrator: Arc<CompletionOrchestrator>,
    pub keep_alive_interval_seconds: u64,
}

impl AppState {
    /// Wire the catalog, probe and orchestrator around an existing registry.
    pub fn new(config: &Config, catalog: ProviderCatalog, registry: ProviderRegistry) -> Self {
        let catalog = Arc::new(catalog);
        let fallback = &config.fallback;

        let probe = Arc::new(ProviderHealthProbe::new(
            Arc::clone(&catalog),
            registry.clone(),
            fallback.default_model.clone(),
            fallback.probe_message.clone(),
            Duration::from_secs(fallback.probe_timeout_seconds),
        ));

        let orchestrator = CompletionOrchestrator::new(Arc::clone(&catalog), registry, Arc::clone(&probe))
            .with_default_model(fallback.default_model.clone())
            .with_attempt_timeout(Duration::from_secs(fallback.attempt_timeout_seconds))
            .with_idle_timeout(Duration::from_secs(config.server.idle_timeout_seconds));

        Self {
            catalog,
            probe,
            orchestrator: Arc::new(orchestrator),
            keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        }
    }

    /// Build state with OpenAI-compatible clients for every configured provider.
    pub fn from_config(config: &Config, client: Client) -> Self {
        let catalog = ProviderCatalog::from_config(&config.providers, &config.models);
        let registry = ProviderRegistry::from_config(config, client);
        Self::new(config, catalog, registry)
    }
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let api = Router::new()
        .route("/providers", get(handlers::list_providers))
        .route("/models", get(handlers::list_models))
        .route("/refresh-providers", post(handlers::refresh_providers))
        .route("/generate", post(handlers::generate))
        .route("/health", get(handlers::health))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .fallback(handlers::not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}
