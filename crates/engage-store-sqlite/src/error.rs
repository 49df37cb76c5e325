//! Error type for `engage-store-sqlite`.

use engage_core::sequence::DocumentKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] engage_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The counter transaction failed and was rolled back. No number was
  /// consumed; callers must not fall back to a cached value.
  #[error("no {kind} number available for company {company_id:?}: {source}")]
  SequenceUnavailable {
    company_id: String,
    kind:       DocumentKind,
    #[source]
    source:     tokio_rusqlite::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
