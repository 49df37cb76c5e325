//! `POST /activity`: an agent action against a lead.
//!
//! The response reflects the ledger write only. Stage and tag updates happen
//! afterwards and never change the status code.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::StatusCode,
  response::IntoResponse,
};
use engage_core::{activity::ActivityInput, store::EngagementStore};
use engage_pipeline::Engine;
use serde_json::json;

use crate::error::ApiError;

pub async fn handler<S>(
  State(engine): State<Engine<S>>,
  body: Result<Json<ActivityInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EngagementStore + 'static,
{
  let Json(input) = body?;
  let record = engine.record_activity(input).await?;
  Ok((
    StatusCode::CREATED,
    Json(json!({ "success": true, "activity": record })),
  ))
}
