//! Error types for `engage-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// One or more required input fields were absent or empty.
  #[error("missing required fields: {}", .0.join(", "))]
  MissingFields(Vec<&'static str>),

  #[error("unknown stage: {0:?}")]
  UnknownStage(String),

  #[error("unknown document kind: {0:?}")]
  UnknownDocumentKind(String),

  #[error("unknown tag type: {0:?}")]
  UnknownTagType(String),

  #[error("unknown device type: {0:?}")]
  UnknownDeviceType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
