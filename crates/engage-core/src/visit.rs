//! Visit sessions, one merged row per (visitor session, company).
//!
//! Browsers send a ping when a rendered site loads and keep pinging while the
//! tab is open (heartbeats, visibility changes). Pings for the same
//! `(session_id, company_id)` pair collapse into a single [`VisitSession`]
//! whose time total never decreases and never exceeds
//! [`MAX_SESSION_SECONDS`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  activity::non_empty,
  device::{DeviceType, browser_name, viewport_width},
};

/// Hard ceiling on the time recorded for one visit session.
pub const MAX_SESSION_SECONDS: u32 = 1800;

// ─── Ping ────────────────────────────────────────────────────────────────────

/// A telemetry ping exactly as the tracking script sends it.
///
/// Fields not listed here (geolocation, client timestamps) are accepted on
/// the wire and dropped during deserialisation; location data is never
/// persisted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitPing {
  pub company_id:   Option<String>,
  pub company_slug: Option<String>,
  pub template_key: Option<String>,
  pub session_id:   Option<String>,
  /// Seconds of active time the page has observed so far.
  pub time_on_page: Option<f64>,
  pub user_agent:   Option<String>,
  pub referrer:     Option<String>,
  pub viewport:     Option<serde_json::Value>,
  /// The client's belief that this is the first ping. Advisory only; the
  /// store decides whether a row is new.
  pub is_initial:   Option<bool>,
  /// Interactions observed since the previous ping. Browsers may send a
  /// float; it is floored.
  pub interactions: Option<f64>,
}

impl VisitPing {
  /// Validate required fields and normalise the untrusted numeric inputs.
  pub fn normalize(self) -> Result<NormalizedPing> {
    let company_id   = non_empty(self.company_id);
    let session_id   = non_empty(self.session_id);
    let template_key = non_empty(self.template_key);

    let (Some(company_id), Some(session_id), Some(template_key)) =
      (company_id.clone(), session_id.clone(), template_key.clone())
    else {
      let mut missing = Vec::new();
      if company_id.is_none() {
        missing.push("companyId");
      }
      if session_id.is_none() {
        missing.push("sessionId");
      }
      if template_key.is_none() {
        missing.push("templateKey");
      }
      return Err(Error::MissingFields(missing));
    };

    let user_agent = non_empty(self.user_agent);
    let width      = self.viewport.as_ref().and_then(viewport_width);

    Ok(NormalizedPing {
      device_type: DeviceType::detect(user_agent.as_deref(), width),
      browser_name: browser_name(user_agent.as_deref()).to_owned(),
      time_on_page: whole_u32(self.time_on_page),
      interactions: whole_u32(self.interactions),
      company_slug: non_empty(self.company_slug),
      referrer: non_empty(self.referrer),
      is_initial_hint: self.is_initial.unwrap_or(false),
      user_agent,
      company_id,
      session_id,
      template_key,
    })
  }
}

/// Floor an untrusted client number into `0..=u32::MAX`; junk becomes 0.
fn whole_u32(raw: Option<f64>) -> u32 {
  match raw {
    Some(s) if s.is_finite() && s > 0.0 => s.floor().min(f64::from(u32::MAX)) as u32,
    _ => 0,
  }
}

/// A validated ping, ready for [`crate::store::EngagementStore::upsert_visit`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPing {
  pub session_id:      String,
  pub company_id:      String,
  pub company_slug:    Option<String>,
  pub template_key:    String,
  /// Whole, non-negative seconds; not yet capped.
  pub time_on_page:    u32,
  pub interactions:    u32,
  pub user_agent:      Option<String>,
  pub referrer:        Option<String>,
  pub device_type:     DeviceType,
  pub browser_name:    String,
  pub is_initial_hint: bool,
}

// ─── Merge rules ─────────────────────────────────────────────────────────────

/// The two mutable counters of a visit session.
///
/// The SQLite backend performs the same arithmetic in a single upsert
/// statement; these functions are the reference the backend is tested
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitTotals {
  pub total_time_seconds: u32,
  pub page_interactions:  u32,
}

impl VisitTotals {
  /// Totals for a freshly created row. Every visit counts as at least one
  /// interaction.
  pub fn first(time_on_page: u32, interactions: u32) -> Self {
    Self {
      total_time_seconds: time_on_page.min(MAX_SESSION_SECONDS),
      page_interactions:  interactions.max(1),
    }
  }

  /// Fold a subsequent ping into existing totals. Time is monotonic and
  /// capped; interactions accumulate.
  pub fn merge(self, time_on_page: u32, interactions: u32) -> Self {
    Self {
      total_time_seconds: time_on_page
        .max(self.total_time_seconds)
        .min(MAX_SESSION_SECONDS),
      page_interactions:  self.page_interactions.saturating_add(interactions),
    }
  }
}

// ─── VisitSession ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitSession {
  pub visit_id:           Uuid,
  pub session_id:         String,
  pub company_id:         String,
  pub company_slug:       Option<String>,
  pub template_key:       String,
  pub user_agent:         Option<String>,
  pub referrer:           Option<String>,
  pub device_type:        DeviceType,
  pub browser_name:       String,
  pub total_time_seconds: u32,
  pub page_interactions:  u32,
  /// Fixed when the row is created.
  pub visit_start_time:   DateTime<Utc>,
  /// `None` until the second ping; then the time of the latest ping.
  pub visit_end_time:     Option<DateTime<Utc>>,
  /// UTC calendar day of `visit_start_time`; keys the daily rollup.
  pub visit_date:         NaiveDate,
  pub is_initial_visit:   bool,
}

impl VisitSession {
  pub fn totals(&self) -> VisitTotals {
    VisitTotals {
      total_time_seconds: self.total_time_seconds,
      page_interactions:  self.page_interactions,
    }
  }
}

/// Outcome of merging one ping into the store.
#[derive(Debug, Clone)]
pub struct VisitUpsert {
  pub visit:    VisitSession,
  /// `true` when this ping created the row.
  pub inserted: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ping() -> VisitPing {
    VisitPing {
      company_id: Some("co-1".into()),
      session_id: Some("sess-1".into()),
      template_key: Some("moderntrust".into()),
      ..Default::default()
    }
  }

  #[test]
  fn missing_fields_are_listed() {
    let err = VisitPing { template_key: Some("t".into()), ..Default::default() }
      .normalize()
      .unwrap_err();
    assert!(matches!(
      err,
      Error::MissingFields(ref f) if f == &["companyId", "sessionId"]
    ));
  }

  #[test]
  fn blank_strings_are_missing() {
    let err = VisitPing { session_id: Some(" ".into()), ..ping() }
      .normalize()
      .unwrap_err();
    assert!(matches!(err, Error::MissingFields(ref f) if f == &["sessionId"]));
  }

  #[test]
  fn numbers_are_floored_and_clamped() {
    let p = VisitPing {
      time_on_page: Some(12.9),
      interactions: Some(-4.0),
      ..ping()
    }
    .normalize()
    .unwrap();
    assert_eq!(p.time_on_page, 12);
    assert_eq!(p.interactions, 0);

    let p = VisitPing { time_on_page: Some(-3.0), ..ping() }.normalize().unwrap();
    assert_eq!(p.time_on_page, 0);
    let p = VisitPing { time_on_page: Some(f64::NAN), ..ping() }
      .normalize()
      .unwrap();
    assert_eq!(p.time_on_page, 0);
  }

  #[test]
  fn fractional_interactions_are_accepted() {
    let raw = serde_json::json!({
      "companyId": "co-1",
      "sessionId": "s",
      "templateKey": "t",
      "interactions": 2.5,
    });
    let p: VisitPing = serde_json::from_value(raw).unwrap();
    assert_eq!(p.normalize().unwrap().interactions, 2);

    let p = VisitPing { interactions: Some(1e12), ..ping() }.normalize().unwrap();
    assert_eq!(p.interactions, u32::MAX);
  }

  #[test]
  fn location_is_dropped_on_the_wire() {
    let raw = serde_json::json!({
      "companyId": "co-1",
      "sessionId": "s",
      "templateKey": "t",
      "timeOnPage": 5,
      "location": { "lat": 33.5, "lng": -86.8 },
      "timestamp": 1_700_000_000_000_i64,
    });
    let p: VisitPing = serde_json::from_value(raw).unwrap();
    assert_eq!(p.normalize().unwrap().time_on_page, 5);
  }

  #[test]
  fn first_totals_cap_and_floor() {
    assert_eq!(VisitTotals::first(4000, 0), VisitTotals {
      total_time_seconds: MAX_SESSION_SECONDS,
      page_interactions:  1,
    });
    assert_eq!(VisitTotals::first(30, 3).page_interactions, 3);
  }

  #[test]
  fn merge_is_monotonic_and_capped() {
    let mut totals = VisitTotals::first(10, 1);
    let mut last = totals.total_time_seconds;
    for t in [40, 25, 0, 900, 2500, 100, 1800] {
      totals = totals.merge(t, 1);
      assert!(totals.total_time_seconds >= last);
      assert!(totals.total_time_seconds <= MAX_SESSION_SECONDS);
      last = totals.total_time_seconds;
    }
    assert_eq!(totals.total_time_seconds, MAX_SESSION_SECONDS);
    assert_eq!(totals.page_interactions, 8);
  }

  #[test]
  fn duplicate_and_stale_pings_commute() {
    let base = VisitTotals::first(60, 1);
    let a = base.merge(30, 0).merge(60, 0);
    let b = base.merge(60, 0).merge(30, 0);
    assert_eq!(a, b);
    assert_eq!(a.total_time_seconds, 60);
  }
}
