//! HTTP host for the engagement pipeline.
//!
//! Wraps the [`engage_api`] router with request tracing and CORS so the
//! tracking script can post from any rendered site.

use std::path::PathBuf;

use axum::{Router, routing::get};
use engage_core::store::EngagementStore;
use engage_pipeline::{Engine, PipelineConfig};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `engage.toml` and
/// `ENGAGE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub pipeline:   PipelineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/engage/engage.db"),
      pipeline:   PipelineConfig::default(),
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router for `engine`.
pub fn router<S>(engine: Engine<S>) -> Router
where
  S: EngagementStore + 'static,
{
  engage_api::api_router(engine)
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
}

async fn health() -> &'static str { "ok" }
