//! Business document numbering.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

/// The first number handed out for a company that has no counter yet.
pub const DEFAULT_START: u64 = 1001;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DocumentKind {
  Invoice,
  Estimate,
}

impl DocumentKind {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownDocumentKind(s.to_owned()))
  }

  pub fn prefix(self) -> &'static str {
    match self {
      Self::Invoice => "INV",
      Self::Estimate => "EST",
    }
  }
}

/// A number allocated by the sequence counter. Displays as e.g. `INV-1007`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentNumber {
  pub kind:   DocumentKind,
  pub number: u64,
}

impl fmt::Display for DocumentNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.kind.prefix(), self.number)
  }
}
