//! Activity ledger records: discrete actions an agent takes against a lead.
//!
//! Records are immutable once written. The `action` column holds whatever
//! string the client sent; only strings that parse into [`Action`] drive stage
//! transitions and tags, everything else is ledgered and otherwise ignored.

use std::str::FromStr as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Action ──────────────────────────────────────────────────────────────────

/// The closed set of agent actions the pipeline understands.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
  PreviewWebsite,
  ViewGoogleReviews,
  CallStarted,
  SmsAnswerCallSent,
  #[strum(serialize = "sms_voicemail_1_sent")]
  SmsVoicemail1Sent,
  #[strum(serialize = "sms_voicemail_2_sent")]
  SmsVoicemail2Sent,
  OwnerNameAdded,
  OwnerEmailAdded,
  NoteAdded,
  TemplateSaved,
  UnsuccessfulCallMarked,
  AppointmentSet,
  SaleMade,
  CallbackReceived,
}

impl Action {
  pub fn as_str(self) -> &'static str { self.into() }

  /// Parse a wire string. Unknown strings yield `None` rather than an error:
  /// they are still valid ledger entries.
  pub fn parse(s: &str) -> Option<Self> { Self::from_str(s).ok() }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// An activity as received from the operator UI, before validation.
///
/// Every field is optional so that validation can report *all* missing fields
/// at once instead of failing on the first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInput {
  pub session_id:  Option<Uuid>,
  pub lead_id:     Option<Uuid>,
  pub company_id:  Option<String>,
  pub user_name:   Option<String>,
  pub action:      Option<String>,
  pub action_data: Option<serde_json::Value>,
}

impl ActivityInput {
  /// Check required fields and produce a [`NewActivity`].
  pub fn validate(self) -> Result<NewActivity> {
    let company_id = non_empty(self.company_id);
    let user_name  = non_empty(self.user_name);
    let action     = non_empty(self.action);

    let mut missing = Vec::new();
    if self.lead_id.is_none() {
      missing.push("leadId");
    }
    if company_id.is_none() {
      missing.push("companyId");
    }
    if user_name.is_none() {
      missing.push("userName");
    }
    if action.is_none() {
      missing.push("action");
    }

    match (self.lead_id, company_id, user_name, action) {
      (Some(lead_id), Some(company_id), Some(user_name), Some(action)) => {
        Ok(NewActivity {
          session_id: self.session_id,
          lead_id,
          company_id,
          user_name,
          action,
          action_data: self
            .action_data
            .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        })
      }
      _ => Err(Error::MissingFields(missing)),
    }
  }
}

/// Trim a string and treat blank values as absent.
pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

// ─── NewActivity ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::EngagementStore::append_activity`].
/// `created_at` is always set by the store.
#[derive(Debug, Clone)]
pub struct NewActivity {
  pub session_id:  Option<Uuid>,
  pub lead_id:     Uuid,
  pub company_id:  String,
  pub user_name:   String,
  pub action:      String,
  pub action_data: serde_json::Value,
}

impl NewActivity {
  /// Convenience constructor for a known action with an empty payload.
  pub fn new(
    lead_id: Uuid,
    company_id: impl Into<String>,
    user_name: impl Into<String>,
    action: Action,
  ) -> Self {
    Self {
      session_id: None,
      lead_id,
      company_id: company_id.into(),
      user_name: user_name.into(),
      action: action.as_str().to_owned(),
      action_data: serde_json::json!({}),
    }
  }

  pub fn in_session(mut self, session_id: Uuid) -> Self {
    self.session_id = Some(session_id);
    self
  }
}

// ─── ActivityRecord ──────────────────────────────────────────────────────────

/// An immutable, append-only ledger entry. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
  pub activity_id: Uuid,
  /// The agent work session this action was taken in, if any.
  pub session_id:  Option<Uuid>,
  pub lead_id:     Uuid,
  pub company_id:  String,
  pub user_name:   String,
  pub action:      String,
  pub action_data: serde_json::Value,
  pub created_at:  DateTime<Utc>,
}

impl ActivityRecord {
  /// The parsed action, or `None` for strings outside the known set.
  pub fn known_action(&self) -> Option<Action> { Action::parse(&self.action) }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn action_wire_names() {
    assert_eq!(Action::SmsVoicemail1Sent.as_str(), "sms_voicemail_1_sent");
    assert_eq!(Action::SmsVoicemail2Sent.as_str(), "sms_voicemail_2_sent");
    assert_eq!(Action::SmsAnswerCallSent.as_str(), "sms_answer_call_sent");
    assert_eq!(
      Action::UnsuccessfulCallMarked.as_str(),
      "unsuccessful_call_marked"
    );
  }

  #[test]
  fn every_action_parses_back() {
    for action in Action::iter() {
      assert_eq!(Action::parse(action.as_str()), Some(action));
    }
    assert_eq!(Action::iter().count(), 14);
  }

  #[test]
  fn unknown_action_is_not_an_error() {
    assert_eq!(Action::parse("fax_sent"), None);
  }

  #[test]
  fn validate_reports_all_missing_fields() {
    let input = ActivityInput {
      company_id: Some("   ".into()),
      ..Default::default()
    };
    let err = input.validate().unwrap_err();
    assert!(matches!(
      err,
      Error::MissingFields(ref f)
        if f == &["leadId", "companyId", "userName", "action"]
    ));
  }

  #[test]
  fn validate_defaults_action_data_to_empty_object() {
    let input = ActivityInput {
      lead_id: Some(Uuid::new_v4()),
      company_id: Some("co-1".into()),
      user_name: Some("sam".into()),
      action: Some("call_started".into()),
      ..Default::default()
    };
    let activity = input.validate().unwrap();
    assert_eq!(activity.action_data, serde_json::json!({}));
    assert!(activity.session_id.is_none());
  }
}
