//! Integration tests for `SqliteStore` against in-memory and on-disk databases.

use std::collections::BTreeSet;

use chrono::Utc;
use engage_core::{
  activity::{Action, NewActivity},
  device::DeviceType,
  rollup::DailyAnalytic,
  sequence::{DocumentKind, DocumentNumber},
  session::WorkSessionStats,
  stage::Stage,
  store::EngagementStore,
  tag::{NewTag, TagType},
  visit::{MAX_SESSION_SECONDS, NormalizedPing, VisitTotals},
};
use uuid::Uuid;

use crate::{Error, SqliteStore, sequence};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A scratch database file, removed (with its WAL side files) on drop.
struct TempDb(std::path::PathBuf);

impl TempDb {
  fn new() -> Self {
    Self(std::env::temp_dir().join(format!("engage-test-{}.db", Uuid::new_v4())))
  }
}

impl Drop for TempDb {
  fn drop(&mut self) {
    for suffix in ["", "-wal", "-shm"] {
      let mut path = self.0.clone().into_os_string();
      path.push(suffix);
      let _ = std::fs::remove_file(path);
    }
  }
}

fn ping(session: &str, company: &str, time: u32, interactions: u32) -> NormalizedPing {
  NormalizedPing {
    session_id:      session.into(),
    company_id:      company.into(),
    company_slug:    Some("acme-hvac".into()),
    template_key:    "moderntrust".into(),
    time_on_page:    time,
    interactions,
    user_agent:      None,
    referrer:        None,
    device_type:     DeviceType::Desktop,
    browser_name:    "Other".into(),
    is_initial_hint: false,
  }
}

// ─── Leads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_lead() {
  let s = store().await;

  let lead = s.create_lead("co-1".into(), Some("met at expo".into())).await.unwrap().unwrap();
  assert_eq!(lead.stage, Stage::NewLead);

  let fetched = s.get_lead(lead.lead_id).await.unwrap().unwrap();
  assert_eq!(fetched.company_id, "co-1");
  assert_eq!(fetched.notes.as_deref(), Some("met at expo"));

  let by_company = s.lead_for_company("co-1".into()).await.unwrap().unwrap();
  assert_eq!(by_company.lead_id, lead.lead_id);

  assert!(s.get_lead(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn one_lead_per_company() {
  let s = store().await;
  let first = s.create_lead("co-1".into(), None).await.unwrap().unwrap();

  assert!(s.create_lead("co-1".into(), None).await.unwrap().is_none());
  let kept = s.lead_for_company("co-1".into()).await.unwrap().unwrap();
  assert_eq!(kept.lead_id, first.lead_id);
}

#[tokio::test]
async fn compare_and_set_stage_requires_expected() {
  let s = store().await;
  let lead = s.create_lead("co-1".into(), None).await.unwrap().unwrap();

  assert!(
    s.compare_and_set_stage(lead.lead_id, Stage::NewLead, Stage::LiveCall)
      .await
      .unwrap()
  );
  // Stale expectation loses.
  assert!(
    !s.compare_and_set_stage(lead.lead_id, Stage::NewLead, Stage::Voicemail)
      .await
      .unwrap()
  );
  assert!(
    !s.compare_and_set_stage(Uuid::new_v4(), Stage::NewLead, Stage::Voicemail)
      .await
      .unwrap()
  );

  let lead = s.get_lead(lead.lead_id).await.unwrap().unwrap();
  assert_eq!(lead.stage, Stage::LiveCall);
}

#[tokio::test]
async fn set_stage_overrides_and_reports_missing() {
  let s = store().await;
  let lead = s.create_lead("co-1".into(), None).await.unwrap().unwrap();

  let moved = s.set_stage(lead.lead_id, Stage::SaleMade).await.unwrap().unwrap();
  assert_eq!(moved.stage, Stage::SaleMade);
  assert!(moved.updated_at >= lead.updated_at);

  assert!(s.set_stage(Uuid::new_v4(), Stage::Contacted).await.unwrap().is_none());
}

// ─── Activity ledger ─────────────────────────────────────────────────────────

#[tokio::test]
async fn activities_are_kept_in_append_order() {
  let s = store().await;
  let lead = Uuid::new_v4();

  let mut custom = NewActivity::new(lead, "co-1", "dana", Action::CallStarted);
  custom.action = "left_sticky_note".into();
  custom.action_data = serde_json::json!({ "color": "yellow" });

  s.append_activity(NewActivity::new(lead, "co-1", "dana", Action::CallStarted))
    .await
    .unwrap();
  s.append_activity(custom).await.unwrap();
  s.append_activity(NewActivity::new(lead, "co-1", "dana", Action::NoteAdded))
    .await
    .unwrap();
  s.append_activity(NewActivity::new(Uuid::new_v4(), "co-2", "dana", Action::NoteAdded))
    .await
    .unwrap();

  let records = s.activities_for_lead(lead).await.unwrap();
  let actions: Vec<_> = records.iter().map(|r| r.action.as_str()).collect();
  assert_eq!(actions, ["call_started", "left_sticky_note", "note_added"]);
  assert_eq!(records[1].known_action(), None);
  assert_eq!(records[1].action_data["color"], "yellow");
}

// ─── Work sessions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn end_session_tallies_ledger() {
  let s = store().await;
  let start = s.start_work_session("dana".into()).await.unwrap();
  assert!(start.closed.is_none());
  let sid = start.started.session_id;

  let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
  for (lead, action) in [
    (a, Action::CallStarted),
    (a, Action::SmsVoicemail2Sent),
    (b, Action::CallStarted),
    (b, Action::OwnerEmailAdded),
  ] {
    s.append_activity(NewActivity::new(lead, "co", "dana", action).in_session(sid))
      .await
      .unwrap();
  }
  // Outside the session; not counted.
  s.append_activity(NewActivity::new(a, "co", "dana", Action::CallStarted))
    .await
    .unwrap();

  let ended = s.end_work_session("dana".into()).await.unwrap().unwrap();
  assert_eq!(ended.session_id, sid);
  assert!(ended.end_time.is_some());
  assert_eq!(ended.stats, WorkSessionStats {
    leads_processed: 2,
    calls_made:      2,
    contacts_made:   1,
    voicemails_left: 1,
  });

  assert!(s.active_work_session("dana".into()).await.unwrap().is_none());
  assert!(s.end_work_session("dana".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn starting_again_closes_the_open_session() {
  let s = store().await;
  let first = s.start_work_session("dana".into()).await.unwrap().started;
  s.append_activity(
    NewActivity::new(Uuid::new_v4(), "co", "dana", Action::CallStarted)
      .in_session(first.session_id),
  )
  .await
  .unwrap();

  let second = s.start_work_session("dana".into()).await.unwrap();
  let closed = second.closed.unwrap();
  assert_eq!(closed.session_id, first.session_id);
  assert_eq!(closed.stats.calls_made, 1);

  let active = s.active_work_session("dana".into()).await.unwrap().unwrap();
  assert_eq!(active.session_id, second.started.session_id);

  // Other agents are unaffected.
  s.start_work_session("lee".into()).await.unwrap();
  assert!(s.active_work_session("dana".into()).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_leave_one_open_session() {
  let s = store().await;

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let s = s.clone();
      tokio::spawn(async move { s.start_work_session("dana".into()).await })
    })
    .collect();

  let mut closed = 0;
  for h in handles {
    if h.await.unwrap().unwrap().closed.is_some() {
      closed += 1;
    }
  }
  assert_eq!(closed, 7);
  assert!(s.active_work_session("dana".into()).await.unwrap().is_some());
}

// ─── Visit sessions ──────────────────────────────────────────────────────────

#[tokio::test]
async fn first_ping_inserts_then_merges() {
  let s = store().await;

  let first = s.upsert_visit(ping("v1", "co", 5, 0)).await.unwrap();
  assert!(first.inserted);
  assert!(first.visit.is_initial_visit);
  assert!(first.visit.visit_end_time.is_none());
  assert_eq!(first.visit.page_interactions, 1);
  assert_eq!(first.visit.visit_date, Utc::now().date_naive());

  let second = s.upsert_visit(ping("v1", "co", 30, 2)).await.unwrap();
  assert!(!second.inserted);
  assert_eq!(second.visit.visit_id, first.visit.visit_id);
  assert_eq!(second.visit.visit_start_time, first.visit.visit_start_time);
  assert!(second.visit.visit_end_time.is_some());
  assert_eq!(second.visit.total_time_seconds, 30);
  assert_eq!(second.visit.page_interactions, 3);

  // Same visitor session on another company is a separate row.
  assert!(s.upsert_visit(ping("v1", "other", 5, 0)).await.unwrap().inserted);
  assert_eq!(s.count_visits("co".into()).await.unwrap(), 1);
}

#[tokio::test]
async fn visit_totals_match_reference_merge() {
  let s = store().await;
  let pings = [(40, 1), (10, 0), (600, 3), (2400, 1), (100, 0), (1800, 2)];

  let mut expected = VisitTotals::first(12, 0);
  s.upsert_visit(ping("v", "co", 12, 0)).await.unwrap();

  for (time, interactions) in pings {
    expected = expected.merge(time, interactions);
    let got = s.upsert_visit(ping("v", "co", time, interactions)).await.unwrap();
    assert_eq!(got.visit.totals(), expected);
  }
  assert_eq!(expected.total_time_seconds, MAX_SESSION_SECONDS);
}

#[tokio::test]
async fn interactions_saturate_instead_of_overflowing() {
  let s = store().await;

  let mut expected = VisitTotals::first(5, u32::MAX);
  s.upsert_visit(ping("flood", "co", 5, u32::MAX)).await.unwrap();
  expected = expected.merge(5, u32::MAX);
  let got = s.upsert_visit(ping("flood", "co", 5, u32::MAX)).await.unwrap();
  assert_eq!(got.visit.totals(), expected);
  assert_eq!(got.visit.page_interactions, u32::MAX);

  // The row stays readable for later pings and for the rollup.
  let later = s.upsert_visit(ping("flood", "co", 9, 1)).await.unwrap();
  assert_eq!(later.visit.page_interactions, u32::MAX);
  assert_eq!(later.visit.total_time_seconds, 9);

  let today = Utc::now().date_naive();
  assert_eq!(s.visits_for_day("co".into(), today).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_pings_create_one_row() {
  let s = store().await;

  let handles: Vec<_> = (0..16)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move { s.upsert_visit(ping("burst", "co", i, 0)).await })
    })
    .collect();

  let mut inserted = 0;
  for h in handles {
    if h.await.unwrap().unwrap().inserted {
      inserted += 1;
    }
  }
  assert_eq!(inserted, 1);
  assert_eq!(s.count_visits("co".into()).await.unwrap(), 1);

  let visit = s.get_visit("burst".into(), "co".into()).await.unwrap().unwrap();
  assert_eq!(visit.total_time_seconds, 15);
}

#[tokio::test]
async fn visits_for_day_filters_company() {
  let s = store().await;
  s.upsert_visit(ping("a", "co", 1, 0)).await.unwrap();
  s.upsert_visit(ping("b", "co", 1, 0)).await.unwrap();
  s.upsert_visit(ping("c", "other", 1, 0)).await.unwrap();

  let today = Utc::now().date_naive();
  assert_eq!(s.visits_for_day("co".into(), today).await.unwrap().len(), 2);
  let yesterday = today.pred_opt().unwrap();
  assert!(s.visits_for_day("co".into(), yesterday).await.unwrap().is_empty());
}

// ─── Daily rollups ───────────────────────────────────────────────────────────

#[tokio::test]
async fn daily_analytic_is_replaced_not_duplicated() {
  let s = store().await;
  let date = Utc::now().date_naive();
  let mut analytic = DailyAnalytic {
    company_id:         "co".into(),
    date,
    total_views:        3,
    unique_sessions:    2,
    mobile_percentage:  33.33,
    total_time_seconds: 95,
    top_referrer:       Some("https://google.com".into()),
  };

  s.put_daily_analytic(analytic.clone()).await.unwrap();
  analytic.total_views = 4;
  analytic.top_referrer = None;
  s.put_daily_analytic(analytic.clone()).await.unwrap();

  let stored = s.get_daily_analytic("co".into(), date).await.unwrap().unwrap();
  assert_eq!(stored, analytic);
  assert!(s.get_daily_analytic("other".into(), date).await.unwrap().is_none());
}

// ─── Tags ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tag_is_inserted_once_per_type() {
  let s = store().await;
  let lead = s.create_lead("co".into(), None).await.unwrap().unwrap();

  let meta = serde_json::json!({ "source": "activity" });
  let first = s
    .insert_tag_if_absent(NewTag::system(lead.lead_id, TagType::AnsweredCall, meta.clone()))
    .await
    .unwrap();
  assert!(first.is_some());

  let again = s
    .insert_tag_if_absent(NewTag::system(lead.lead_id, TagType::AnsweredCall, meta))
    .await
    .unwrap();
  assert!(again.is_none());

  s.insert_tag_if_absent(NewTag::system(
    lead.lead_id,
    TagType::ReturnVisitor,
    serde_json::json!({}),
  ))
  .await
  .unwrap();

  let tags = s.tags_for_lead(lead.lead_id).await.unwrap();
  let types: Vec<_> = tags.iter().map(|t| t.tag_type).collect();
  assert_eq!(types, [TagType::AnsweredCall, TagType::ReturnVisitor]);
  assert!(tags.iter().all(|t| t.created_by == "system"));
}

#[tokio::test]
async fn tag_for_unknown_lead_is_rejected() {
  let s = store().await;
  let result = s
    .insert_tag_if_absent(NewTag::system(
      Uuid::new_v4(),
      TagType::AnsweredCall,
      serde_json::json!({}),
    ))
    .await;
  assert!(matches!(result, Err(Error::Database(_))));
}

// ─── Sequence counter ────────────────────────────────────────────────────────

#[tokio::test]
async fn first_numbers_start_at_default() {
  let s = store().await;

  let mut issued = Vec::new();
  for _ in 0..4 {
    issued.push(s.next_number("co".into(), DocumentKind::Invoice).await.unwrap());
  }
  let labels: Vec<_> = issued.iter().map(DocumentNumber::to_string).collect();
  assert_eq!(labels, ["INV-1001", "INV-1002", "INV-1003", "INV-1004"]);

  // Kinds and companies count independently.
  let est = s.next_number("co".into(), DocumentKind::Estimate).await.unwrap();
  assert_eq!(est.to_string(), "EST-1001");
  let other = s.next_number("co-2".into(), DocumentKind::Invoice).await.unwrap();
  assert_eq!(other.number, 1001);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_numbers_are_unique_and_contiguous() {
  let s = store().await;

  let handles: Vec<_> = (0..50)
    .map(|_| {
      let s = s.clone();
      tokio::spawn(async move { s.next_number("co".into(), DocumentKind::Invoice).await })
    })
    .collect();

  let mut numbers = BTreeSet::new();
  for h in handles {
    numbers.insert(h.await.unwrap().unwrap().number);
  }
  assert_eq!(numbers, (1001..1051).collect::<BTreeSet<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn numbers_stay_unique_across_connections() {
  let db = TempDb::new();
  let a = SqliteStore::open(&db.0).await.unwrap();
  let b = SqliteStore::open(&db.0).await.unwrap();

  let handles: Vec<_> = (0..40)
    .map(|i| {
      let s = if i % 2 == 0 { a.clone() } else { b.clone() };
      tokio::spawn(async move { s.next_number("co".into(), DocumentKind::Estimate).await })
    })
    .collect();

  let mut numbers = BTreeSet::new();
  for h in handles {
    assert!(numbers.insert(h.await.unwrap().unwrap().number));
  }
  assert_eq!(numbers, (1001..1041).collect::<BTreeSet<_>>());
}

#[tokio::test]
async fn rolled_back_transaction_consumes_nothing() {
  let s = store().await;

  let result = s
    .transaction(|tx| {
      sequence::allocate(tx, "co", DocumentKind::Invoice)?;
      Err::<(), _>(rusqlite::Error::QueryReturnedNoRows)
    })
    .await;
  assert!(result.is_err());

  let pair = s
    .transaction(|tx| {
      let first = sequence::allocate(tx, "co", DocumentKind::Invoice)?;
      let second = sequence::allocate(tx, "co", DocumentKind::Invoice)?;
      Ok((first.number, second.number))
    })
    .await
    .unwrap();
  assert_eq!(pair, (1001, 1002));
}

#[tokio::test]
async fn numbered_document_commits_with_its_number() {
  let s = store().await;
  s.transaction(|tx| {
    tx.execute_batch("CREATE TABLE invoices (number TEXT PRIMARY KEY, company_id TEXT NOT NULL)")
  })
  .await
  .unwrap();

  let number = s
    .transaction_with_number("co", DocumentKind::Invoice, |tx, number| {
      tx.execute(
        "INSERT INTO invoices (number, company_id) VALUES (?1, 'co')",
        [number.to_string()],
      )?;
      Ok(number)
    })
    .await
    .unwrap();
  assert_eq!(number.to_string(), "INV-1001");

  // A failed document insert rolls the number back with it.
  let err = s
    .transaction_with_number("co", DocumentKind::Invoice, |tx, _| {
      tx.execute("INSERT INTO invoices (number, company_id) VALUES ('INV-1001', 'co')", [])?;
      Ok(())
    })
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::SequenceUnavailable { ref company_id, kind: DocumentKind::Invoice, .. } if company_id == "co"
  ));

  let next = s.next_number("co".into(), DocumentKind::Invoice).await.unwrap();
  assert_eq!(next.number, 1002);
}

#[tokio::test]
async fn broken_counter_reports_sequence_unavailable() {
  let s = store().await;
  s.transaction(|tx| tx.execute_batch("DROP TABLE sequence_counters"))
    .await
    .unwrap();

  let err = s
    .transaction_with_number("co", DocumentKind::Estimate, |_, number| Ok(number))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SequenceUnavailable { kind: DocumentKind::Estimate, .. }));

  let err = s.next_number("co".into(), DocumentKind::Invoice).await.unwrap_err();
  assert!(matches!(err, Error::SequenceUnavailable { .. }));
}
