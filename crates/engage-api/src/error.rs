//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing required fields: {}", .0.join(", "))]
  MissingFields(Vec<&'static str>),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("service unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<engage_pipeline::Error> for ApiError {
  fn from(e: engage_pipeline::Error) -> Self {
    use engage_pipeline::Error as E;
    match e {
      E::Validation(engage_core::Error::MissingFields(fields)) => Self::MissingFields(fields),
      E::Validation(other) => Self::BadRequest(other.to_string()),
      E::Persistence(source) => Self::Store(source),
      E::SequenceUnavailable(source) => Self::Unavailable(source.to_string()),
      E::NotFound(m) => Self::NotFound(m),
      E::Conflict(m) => Self::Conflict(m),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::MissingFields(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match &self {
      ApiError::MissingFields(fields) => json!({
        "success": false,
        "error":   self.to_string(),
        "missing": fields,
      }),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "request failed in the store");
        json!({ "success": false, "error": "internal storage error" })
      }
      _ => json!({ "success": false, "error": self.to_string() }),
    };

    (status, Json(body)).into_response()
  }
}
