//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar days are `YYYY-MM-DD`, UUIDs are
//! hyphenated lowercase strings and free-form payloads are compact JSON.
//! Enum columns hold the same strings the types serialise to on the wire.

use chrono::{DateTime, NaiveDate, Utc};
use engage_core::{
  activity::ActivityRecord,
  device::DeviceType,
  lead::Lead,
  rollup::DailyAnalytic,
  session::{WorkSession, WorkSessionStats},
  stage::Stage,
  tag::{Tag, TagType},
  visit::VisitSession,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_json(s: &str) -> Result<serde_json::Value> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawLead::from_row`].
pub const LEAD_COLUMNS: &str =
  "lead_id, company_id, stage, notes, created_at, updated_at";

pub struct RawLead {
  pub lead_id:    String,
  pub company_id: String,
  pub stage:      String,
  pub notes:      Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawLead {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      lead_id:    row.get(0)?,
      company_id: row.get(1)?,
      stage:      row.get(2)?,
      notes:      row.get(3)?,
      created_at: row.get(4)?,
      updated_at: row.get(5)?,
    })
  }

  pub fn into_lead(self) -> Result<Lead> {
    Ok(Lead {
      lead_id:    decode_uuid(&self.lead_id)?,
      company_id: self.company_id,
      stage:      Stage::parse(&self.stage)?,
      notes:      self.notes,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const ACTIVITY_COLUMNS: &str = "activity_id, session_id, lead_id, company_id, \
                                    user_name, action, action_data, created_at";

pub struct RawActivity {
  pub activity_id: String,
  pub session_id:  Option<String>,
  pub lead_id:     String,
  pub company_id:  String,
  pub user_name:   String,
  pub action:      String,
  pub action_data: String,
  pub created_at:  String,
}

impl RawActivity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id: row.get(0)?,
      session_id:  row.get(1)?,
      lead_id:     row.get(2)?,
      company_id:  row.get(3)?,
      user_name:   row.get(4)?,
      action:      row.get(5)?,
      action_data: row.get(6)?,
      created_at:  row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<ActivityRecord> {
    Ok(ActivityRecord {
      activity_id: decode_uuid(&self.activity_id)?,
      session_id:  self.session_id.as_deref().map(decode_uuid).transpose()?,
      lead_id:     decode_uuid(&self.lead_id)?,
      company_id:  self.company_id,
      user_name:   self.user_name,
      action:      self.action,
      action_data: decode_json(&self.action_data)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const WORK_SESSION_COLUMNS: &str = "session_id, user_name, start_time, end_time, \
                                        leads_processed, calls_made, contacts_made, \
                                        voicemails_left";

pub struct RawWorkSession {
  pub session_id: String,
  pub user_name:  String,
  pub start_time: String,
  pub end_time:   Option<String>,
  pub stats:      WorkSessionStats,
}

impl RawWorkSession {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id: row.get(0)?,
      user_name:  row.get(1)?,
      start_time: row.get(2)?,
      end_time:   row.get(3)?,
      stats:      WorkSessionStats {
        leads_processed: row.get(4)?,
        calls_made:      row.get(5)?,
        contacts_made:   row.get(6)?,
        voicemails_left: row.get(7)?,
      },
    })
  }

  pub fn into_session(self) -> Result<WorkSession> {
    Ok(WorkSession {
      session_id: decode_uuid(&self.session_id)?,
      user_name:  self.user_name,
      start_time: decode_dt(&self.start_time)?,
      end_time:   self.end_time.as_deref().map(decode_dt).transpose()?,
      stats:      self.stats,
    })
  }
}

pub const VISIT_COLUMNS: &str = "visit_id, session_id, company_id, company_slug, \
                                 template_key, user_agent, referrer, device_type, \
                                 browser_name, total_time_seconds, page_interactions, \
                                 visit_start_time, visit_end_time, visit_date, \
                                 is_initial_visit";

pub struct RawVisit {
  pub visit_id:           String,
  pub session_id:         String,
  pub company_id:         String,
  pub company_slug:       Option<String>,
  pub template_key:       String,
  pub user_agent:         Option<String>,
  pub referrer:           Option<String>,
  pub device_type:        String,
  pub browser_name:       String,
  pub total_time_seconds: u32,
  pub page_interactions:  u32,
  pub visit_start_time:   String,
  pub visit_end_time:     Option<String>,
  pub visit_date:         String,
  pub is_initial_visit:   bool,
}

impl RawVisit {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      visit_id:           row.get(0)?,
      session_id:         row.get(1)?,
      company_id:         row.get(2)?,
      company_slug:       row.get(3)?,
      template_key:       row.get(4)?,
      user_agent:         row.get(5)?,
      referrer:           row.get(6)?,
      device_type:        row.get(7)?,
      browser_name:       row.get(8)?,
      total_time_seconds: row.get(9)?,
      page_interactions:  row.get(10)?,
      visit_start_time:   row.get(11)?,
      visit_end_time:     row.get(12)?,
      visit_date:         row.get(13)?,
      is_initial_visit:   row.get(14)?,
    })
  }

  pub fn into_visit(self) -> Result<VisitSession> {
    Ok(VisitSession {
      visit_id:           decode_uuid(&self.visit_id)?,
      session_id:         self.session_id,
      company_id:         self.company_id,
      company_slug:       self.company_slug,
      template_key:       self.template_key,
      user_agent:         self.user_agent,
      referrer:           self.referrer,
      device_type:        DeviceType::parse(&self.device_type)?,
      browser_name:       self.browser_name,
      total_time_seconds: self.total_time_seconds,
      page_interactions:  self.page_interactions,
      visit_start_time:   decode_dt(&self.visit_start_time)?,
      visit_end_time:     self.visit_end_time.as_deref().map(decode_dt).transpose()?,
      visit_date:         decode_date(&self.visit_date)?,
      is_initial_visit:   self.is_initial_visit,
    })
  }
}

pub struct RawDailyAnalytic {
  pub company_id:         String,
  pub date:               String,
  pub total_views:        u32,
  pub unique_sessions:    u32,
  pub mobile_percentage:  f64,
  pub total_time_seconds: i64,
  pub top_referrer:       Option<String>,
}

impl RawDailyAnalytic {
  pub fn into_analytic(self) -> Result<DailyAnalytic> {
    Ok(DailyAnalytic {
      company_id:         self.company_id,
      date:               decode_date(&self.date)?,
      total_views:        self.total_views,
      unique_sessions:    self.unique_sessions,
      mobile_percentage:  self.mobile_percentage,
      total_time_seconds: self.total_time_seconds.max(0) as u64,
      top_referrer:       self.top_referrer,
    })
  }
}

pub const TAG_COLUMNS: &str =
  "tag_id, lead_id, tag_type, metadata, created_by, created_at";

pub struct RawTag {
  pub tag_id:     String,
  pub lead_id:    String,
  pub tag_type:   String,
  pub metadata:   String,
  pub created_by: String,
  pub created_at: String,
}

impl RawTag {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      tag_id:     row.get(0)?,
      lead_id:    row.get(1)?,
      tag_type:   row.get(2)?,
      metadata:   row.get(3)?,
      created_by: row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_tag(self) -> Result<Tag> {
    Ok(Tag {
      tag_id:     decode_uuid(&self.tag_id)?,
      lead_id:    decode_uuid(&self.lead_id)?,
      tag_type:   TagType::parse(&self.tag_type)?,
      metadata:   decode_json(&self.metadata)?,
      created_by: self.created_by,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
