//! Lead: a company's single entry in the sales pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::Stage;

/// One row per company. `stage` is the only field the engine mutates; the
/// operator UI may also overwrite it freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
  pub lead_id:    Uuid,
  pub company_id: String,
  pub stage:      Stage,
  pub notes:      Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
