//! Lead tags and the auto-tagging rules.
//!
//! A lead carries at most one tag of each [`TagType`]. The rules below only
//! say which tags an event *wants*; the store's conditional insert is what
//! makes repeated events harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result, activity::Action, stage::Stage};

/// Author recorded on tags created by the pipeline.
pub const SYSTEM_AUTHOR: &str = "system";

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TagType {
  AnsweredCall,
  VoicemailLeft,
  ViewedDuringCall,
  ViewedAfterVoicemail,
  ReturnVisitor,
  CallbackReceived,
}

impl TagType {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownTagType(s.to_owned()))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
  pub tag_id:     Uuid,
  pub lead_id:    Uuid,
  pub tag_type:   TagType,
  pub metadata:   serde_json::Value,
  pub created_by: String,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::EngagementStore::insert_tag_if_absent`].
#[derive(Debug, Clone)]
pub struct NewTag {
  pub lead_id:    Uuid,
  pub tag_type:   TagType,
  pub metadata:   serde_json::Value,
  pub created_by: String,
}

impl NewTag {
  pub fn system(lead_id: Uuid, tag_type: TagType, metadata: serde_json::Value) -> Self {
    Self {
      lead_id,
      tag_type,
      metadata,
      created_by: SYSTEM_AUTHOR.to_owned(),
    }
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

const ACTIVITY_TAGS: &[(Action, TagType)] = &[
  (Action::SmsAnswerCallSent, TagType::AnsweredCall),
  (Action::SmsVoicemail1Sent, TagType::VoicemailLeft),
  (Action::SmsVoicemail2Sent, TagType::VoicemailLeft),
  (Action::CallbackReceived, TagType::CallbackReceived),
];

/// Stage-dependent tags for a lead whose site just received a new visitor.
const VISIT_STAGE_TAGS: &[(Stage, TagType)] = &[
  (Stage::LiveCall, TagType::ViewedDuringCall),
  (Stage::Voicemail, TagType::ViewedAfterVoicemail),
];

/// Tags an agent action asks for. Most actions ask for none.
pub fn tags_for_action(action: Action) -> impl Iterator<Item = TagType> {
  ACTIVITY_TAGS
    .iter()
    .filter(move |(a, _)| *a == action)
    .map(|(_, t)| *t)
}

/// Tags a new visit session asks for, given the lead's stage at the time of
/// the visit and how many earlier visit sessions the company has had.
pub fn tags_for_visit(stage: Stage, prior_visits: u64) -> Vec<TagType> {
  let mut tags: Vec<TagType> = VISIT_STAGE_TAGS
    .iter()
    .filter(|(s, _)| *s == stage)
    .map(|(_, t)| *t)
    .collect();
  if prior_visits > 0 {
    tags.push(TagType::ReturnVisitor);
  }
  tags
}
