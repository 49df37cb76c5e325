//! `POST /track`: visit telemetry from the tracking script.
//!
//! Body: `{companyId, sessionId, templateKey, timeOnPage, ...}`. Only the
//! first three are required. Location fields are accepted and discarded.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use engage_core::{store::EngagementStore, visit::VisitPing};
use engage_pipeline::Engine;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
  pub success:       bool,
  pub session_id:    String,
  /// Stored session total after this ping, in seconds.
  pub time_recorded: u32,
  pub is_update:     bool,
  pub tracking_id:   Uuid,
  pub template_key:  String,
}

pub async fn handler<S>(
  State(engine): State<Engine<S>>,
  body: Result<Json<VisitPing>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError>
where
  S: EngagementStore + 'static,
{
  let Json(ping) = body?;
  let update = engine.ingest_visit(ping).await?;

  Ok(Json(TrackResponse {
    success:       true,
    time_recorded: update.visit.total_time_seconds,
    is_update:     update.is_update,
    tracking_id:   update.visit.visit_id,
    session_id:    update.visit.session_id,
    template_key:  update.visit.template_key,
  }))
}
