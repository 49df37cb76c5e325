//! Agent work sessions.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sessions/start` | Body `{"userName"}`; closes any open session first |
//! | `POST` | `/sessions/end`   | Body `{"userName"}`; `session` is `null` if none was open |
//! | `GET`  | `/sessions/current?userName=` | The agent's open session or `null` |

use axum::{
  Json,
  extract::{
    Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
};
use engage_core::{session::WorkSession, store::EngagementStore};
use engage_pipeline::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Request body for start/end, also used as the query for `current`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
  pub user_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
  pub success:        bool,
  pub session:        WorkSession,
  pub closed_session: Option<WorkSession>,
}

#[derive(Debug, Serialize)]
pub struct EndResponse {
  pub success: bool,
  pub session: Option<WorkSession>,
}

/// `POST /sessions/start`
pub async fn start<S>(
  State(engine): State<Engine<S>>,
  body: Result<Json<SessionBody>, JsonRejection>,
) -> Result<Json<StartResponse>, ApiError>
where
  S: EngagementStore + 'static,
{
  let Json(body) = body?;
  let start = engine.start_work_session(body.user_name).await?;
  Ok(Json(StartResponse {
    success:        true,
    session:        start.started,
    closed_session: start.closed,
  }))
}

/// `POST /sessions/end`
pub async fn end<S>(
  State(engine): State<Engine<S>>,
  body: Result<Json<SessionBody>, JsonRejection>,
) -> Result<Json<EndResponse>, ApiError>
where
  S: EngagementStore + 'static,
{
  let Json(body) = body?;
  let session = engine.end_work_session(body.user_name).await?;
  Ok(Json(EndResponse { success: true, session }))
}

/// `GET /sessions/current`
pub async fn current<S>(
  State(engine): State<Engine<S>>,
  params: Result<Query<SessionBody>, QueryRejection>,
) -> Result<Json<EndResponse>, ApiError>
where
  S: EngagementStore + 'static,
{
  let Query(params) = params?;
  let session = engine.current_work_session(params.user_name).await?;
  Ok(Json(EndResponse { success: true, session }))
}
