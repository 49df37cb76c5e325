//! Error types for `engage-pipeline`.

use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced to the caller of an [`crate::Engine`] operation.
#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or missing input. Nothing was written.
  #[error("invalid request: {0}")]
  Validation(#[from] engage_core::Error),

  /// The primary write (or read) failed in the store.
  #[error("store failure: {0}")]
  Persistence(#[source] BoxError),

  /// The counter transaction failed and rolled back; the document cannot be
  /// numbered.
  #[error("sequence unavailable: {0}")]
  SequenceUnavailable(#[source] BoxError),

  #[error("{0} not found")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),
}

impl Error {
  pub(crate) fn persistence(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Persistence(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A failure in a derived effect after its primary write succeeded.
///
/// These are logged and dead-lettered by [`crate::BackgroundTasks`]; they are
/// never returned to the request that caused them.
#[derive(Debug, Error)]
pub enum EffectError {
  #[error("store failure: {0}")]
  Store(#[source] BoxError),

  #[error("lead {0} not found")]
  LeadNotFound(Uuid),

  #[error("stage of lead {lead_id} changed under us {attempts} times; giving up")]
  Contended { lead_id: Uuid, attempts: u32 },
}

impl EffectError {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<Error> for EffectError {
  fn from(e: Error) -> Self { Self::Store(Box::new(e)) }
}
