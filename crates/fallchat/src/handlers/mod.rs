//! HTTP request handlers.

mod api;
mod generate;

pub use api::{health, list_models, list_providers, not_found, refresh_providers};
pub use generate::generate;
