//! Agent work sessions (cold-call sessions) and their close-time counters.

use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::Action;

/// A bounded span of agent activity. At most one session per agent has
/// `end_time == None` at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSession {
  pub session_id: Uuid,
  pub user_name:  String,
  pub start_time: DateTime<Utc>,
  pub end_time:   Option<DateTime<Utc>>,
  /// All zero while the session is open; filled in when it is closed.
  #[serde(flatten)]
  pub stats:      WorkSessionStats,
}

impl WorkSession {
  pub fn is_open(&self) -> bool { self.end_time.is_none() }
}

/// Rollup counters computed from the ledger entries sharing a session id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSessionStats {
  pub leads_processed: u32,
  pub calls_made:      u32,
  pub contacts_made:   u32,
  pub voicemails_left: u32,
}

impl WorkSessionStats {
  /// Tally `(lead, action)` pairs from a session's activity records.
  ///
  /// Unknown action strings still count towards `leads_processed`.
  pub fn tally<'a, L>(entries: impl IntoIterator<Item = (L, &'a str)>) -> Self
  where
    L: Eq + Hash,
  {
    let mut leads = HashSet::new();
    let mut stats = Self::default();

    for (lead, action) in entries {
      leads.insert(lead);
      match Action::parse(action) {
        Some(Action::CallStarted) => stats.calls_made += 1,
        Some(Action::OwnerEmailAdded) => stats.contacts_made += 1,
        Some(Action::SmsVoicemail2Sent) => stats.voicemails_left += 1,
        _ => {}
      }
    }

    stats.leads_processed = leads.len() as u32;
    stats
  }
}
