//! Per-company, per-day visit summaries.
//!
//! A [`DailyAnalytic`] is always recomputed from scratch from the visit rows
//! of its day. It is never incremented, so replaying a trigger can never
//! double-count.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{device::DeviceType, visit::VisitSession};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAnalytic {
  pub company_id:         String,
  pub date:               NaiveDate,
  /// Number of visit rows.
  pub total_views:        u32,
  /// Number of distinct visitor session ids.
  pub unique_sessions:    u32,
  /// Share of rows from mobile devices, 0–100, two decimal places.
  pub mobile_percentage:  f64,
  /// Sum of the (capped) per-session time totals.
  pub total_time_seconds: u64,
  /// Most frequent non-empty referrer; ties go to the lexicographically
  /// smallest.
  pub top_referrer:       Option<String>,
}

impl DailyAnalytic {
  /// Summarise `visits` for `(company_id, date)`. Rows for any other company
  /// or day are ignored.
  pub fn compute(company_id: &str, date: NaiveDate, visits: &[VisitSession]) -> Self {
    let rows: Vec<&VisitSession> = visits
      .iter()
      .filter(|v| v.company_id == company_id && v.visit_date == date)
      .collect();

    let total_views = rows.len() as u32;
    let unique_sessions = rows
      .iter()
      .map(|v| v.session_id.as_str())
      .collect::<HashSet<_>>()
      .len() as u32;
    let mobile = rows
      .iter()
      .filter(|v| v.device_type == DeviceType::Mobile)
      .count();
    let total_time_seconds = rows
      .iter()
      .map(|v| u64::from(v.total_time_seconds))
      .sum();

    let mut referrers: BTreeMap<&str, usize> = BTreeMap::new();
    for r in rows.iter().filter_map(|v| v.referrer.as_deref()) {
      if !r.is_empty() {
        *referrers.entry(r).or_default() += 1;
      }
    }
    let mut top_referrer: Option<(&str, usize)> = None;
    for (r, n) in referrers {
      if top_referrer.is_none_or(|(_, best)| n > best) {
        top_referrer = Some((r, n));
      }
    }

    Self {
      company_id: company_id.to_owned(),
      date,
      total_views,
      unique_sessions,
      mobile_percentage: percentage(mobile, rows.len()),
      total_time_seconds,
      top_referrer: top_referrer.map(|(r, _)| r.to_owned()),
    }
  }
}

fn percentage(part: usize, total: usize) -> f64 {
  if total == 0 {
    return 0.0;
  }
  let raw = part as f64 / total as f64 * 100.0;
  (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone as _, Utc};
  use uuid::Uuid;

  use super::*;

  fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, 3).unwrap() }

  fn visit(session: &str, device: DeviceType, referrer: Option<&str>) -> VisitSession {
    VisitSession {
      visit_id:           Uuid::new_v4(),
      session_id:         session.into(),
      company_id:         "co-1".into(),
      company_slug:       None,
      template_key:       "t".into(),
      user_agent:         None,
      referrer:           referrer.map(Into::into),
      device_type:        device,
      browser_name:       "Other".into(),
      total_time_seconds: 60,
      page_interactions:  1,
      visit_start_time:   Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap(),
      visit_end_time:     None,
      visit_date:         day(),
      is_initial_visit:   true,
    }
  }

  #[test]
  fn summarises_a_day() {
    let visits = vec![
      visit("a", DeviceType::Mobile, Some("https://google.com")),
      visit("b", DeviceType::Desktop, Some("https://google.com")),
      visit("c", DeviceType::Mobile, Some("https://bing.com")),
    ];
    let a = DailyAnalytic::compute("co-1", day(), &visits);
    assert_eq!(a.total_views, 3);
    assert_eq!(a.unique_sessions, 3);
    assert_eq!(a.mobile_percentage, 66.67);
    assert_eq!(a.total_time_seconds, 180);
    assert_eq!(a.top_referrer.as_deref(), Some("https://google.com"));
  }

  #[test]
  fn ignores_other_companies_and_days() {
    let mut other_co = visit("x", DeviceType::Mobile, None);
    other_co.company_id = "co-2".into();
    let mut other_day = visit("y", DeviceType::Mobile, None);
    other_day.visit_date = day().succ_opt().unwrap();

    let a = DailyAnalytic::compute("co-1", day(), &[
      other_co,
      other_day,
      visit("z", DeviceType::Desktop, None),
    ]);
    assert_eq!(a.total_views, 1);
    assert_eq!(a.mobile_percentage, 0.0);
    assert_eq!(a.top_referrer, None);
  }

  #[test]
  fn empty_day_is_all_zero() {
    let a = DailyAnalytic::compute("co-1", day(), &[]);
    assert_eq!(a.total_views, 0);
    assert_eq!(a.unique_sessions, 0);
    assert_eq!(a.mobile_percentage, 0.0);
  }

  #[test]
  fn referrer_ties_break_alphabetically() {
    let visits = vec![
      visit("a", DeviceType::Desktop, Some("https://yelp.com")),
      visit("b", DeviceType::Desktop, Some("https://bing.com")),
      visit("c", DeviceType::Desktop, Some("")),
    ];
    let a = DailyAnalytic::compute("co-1", day(), &visits);
    assert_eq!(a.top_referrer.as_deref(), Some("https://bing.com"));
  }

  #[test]
  fn recompute_is_pure() {
    let visits = vec![
      visit("a", DeviceType::Mobile, None),
      visit("b", DeviceType::Tablet, None),
    ];
    assert_eq!(
      DailyAnalytic::compute("co-1", day(), &visits),
      DailyAnalytic::compute("co-1", day(), &visits)
    );
  }
}
