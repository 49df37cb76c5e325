//! JSON HTTP surface for the engagement pipeline.
//!
//! Exposes an axum [`Router`] over an [`engage_pipeline::Engine`]. Auth, TLS
//! and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = engage_api::api_router(engine.clone());
//! ```

pub mod activity;
pub mod analytics;
pub mod error;
pub mod leads;
pub mod sessions;
pub mod track;

use axum::{
  Router,
  routing::{get, post, put},
};
use engage_core::store::EngagementStore;
use engage_pipeline::Engine;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Engine<S>) -> Router<()>
where
  S: EngagementStore + 'static,
{
  Router::new()
    // Telemetry
    .route("/track", post(track::handler::<S>))
    // Agent workflow
    .route("/activity", post(activity::handler::<S>))
    .route("/sessions/start", post(sessions::start::<S>))
    .route("/sessions/end", post(sessions::end::<S>))
    .route("/sessions/current", get(sessions::current::<S>))
    // Leads
    .route("/leads", post(leads::create::<S>))
    .route("/leads/{id}", get(leads::get_one::<S>))
    .route("/leads/{id}/activities", get(leads::activities::<S>))
    .route("/leads/{id}/stage", put(leads::set_stage::<S>))
    // Reporting
    .route("/analytics/daily", get(analytics::daily::<S>))
    .with_state(engine)
}
