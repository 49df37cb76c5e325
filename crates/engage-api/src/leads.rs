//! Handlers for `/leads` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/leads` | Body: `{"companyId", "notes"?}`; 409 if the company already has one |
//! | `GET`  | `/leads/:id` | Lead with its tags; 404 if not found |
//! | `GET`  | `/leads/:id/activities` | Ledger entries, oldest first |
//! | `PUT`  | `/leads/:id/stage` | Body: `{"stage"}`; operator override, any stage |

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
  http::StatusCode,
  response::IntoResponse,
};
use engage_core::{
  activity::ActivityRecord,
  lead::Lead,
  stage::Stage,
  store::EngagementStore,
};
use engage_pipeline::{Engine, LeadView};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub company_id: Option<String>,
  pub notes:      Option<String>,
}

/// `POST /leads`
pub async fn create<S>(
  State(engine): State<Engine<S>>,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EngagementStore + 'static,
{
  let Json(body) = body?;
  let lead = engine.create_lead(body.company_id, body.notes).await?;
  Ok((StatusCode::CREATED, Json(lead)))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET /leads/:id`
pub async fn get_one<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<LeadView>, ApiError>
where
  S: EngagementStore + 'static,
{
  Ok(Json(engine.lead(id).await?))
}

/// `GET /leads/:id/activities`
pub async fn activities<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ActivityRecord>>, ApiError>
where
  S: EngagementStore + 'static,
{
  Ok(Json(engine.activities_for_lead(id).await?))
}

// ─── Stage override ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StageBody {
  pub stage: Stage,
}

/// `PUT /leads/:id/stage`
pub async fn set_stage<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  body: Result<Json<StageBody>, JsonRejection>,
) -> Result<Json<Lead>, ApiError>
where
  S: EngagementStore + 'static,
{
  let Json(body) = body?;
  Ok(Json(engine.set_stage(id, body.stage).await?))
}
