//! The `EngagementStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `engage-store-sqlite`).
//! The pipeline engine and HTTP layer depend on this abstraction, not on any
//! concrete backend.
//!
//! Every method that the engine relies on for a concurrency guarantee says so
//! in its docs; backends must provide that guarantee atomically rather than
//! with a read followed by a write.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  activity::{ActivityRecord, NewActivity},
  lead::Lead,
  rollup::DailyAnalytic,
  sequence::{DocumentKind, DocumentNumber},
  session::WorkSession,
  stage::Stage,
  tag::{NewTag, Tag},
  visit::{NormalizedPing, VisitSession, VisitUpsert},
};

/// Result of opening a work session.
#[derive(Debug, Clone)]
pub struct SessionStart {
  pub started: WorkSession,
  /// The agent's previously open session, closed as a side effect.
  pub closed:  Option<WorkSession>,
}

/// Abstraction over an engagement store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EngagementStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Leads ─────────────────────────────────────────────────────────────

  /// Create the pipeline entry for a company at [`Stage::NewLead`].
  /// Returns `None` if the company already has one.
  fn create_lead(
    &self,
    company_id: String,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  fn get_lead(
    &self,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  fn lead_for_company(
    &self,
    company_id: String,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  /// Unconditionally overwrite a lead's stage (operator override).
  /// Returns `None` if the lead does not exist.
  fn set_stage(
    &self,
    lead_id: Uuid,
    stage: Stage,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  /// Atomically move a lead from `expected` to `next`. Returns `false` when
  /// the lead's stage was no longer `expected` (or the lead is gone).
  fn compare_and_set_stage(
    &self,
    lead_id: Uuid,
    expected: Stage,
    next: Stage,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Activity ledger (append-only) ────────────────────────────────────

  /// Append an activity record. `created_at` is set by the store.
  fn append_activity(
    &self,
    input: NewActivity,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_;

  /// All records for a lead, oldest first.
  fn activities_for_lead(
    &self,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ActivityRecord>, Self::Error>> + Send + '_;

  // ── Work sessions ─────────────────────────────────────────────────────

  /// Open a new session for `user_name`, closing (and tallying) any session
  /// the agent still has open. Atomic: the agent never has two open
  /// sessions.
  fn start_work_session(
    &self,
    user_name: String,
  ) -> impl Future<Output = Result<SessionStart, Self::Error>> + Send + '_;

  /// Close the agent's open session, computing its counters from the ledger.
  /// Returns `None` if no session was open.
  fn end_work_session(
    &self,
    user_name: String,
  ) -> impl Future<Output = Result<Option<WorkSession>, Self::Error>> + Send + '_;

  fn active_work_session(
    &self,
    user_name: String,
  ) -> impl Future<Output = Result<Option<WorkSession>, Self::Error>> + Send + '_;

  // ── Visit sessions ────────────────────────────────────────────────────

  /// Insert-or-merge a ping keyed by `(session_id, company_id)` following
  /// [`crate::visit::VisitTotals`]. Atomic: concurrent first pings for the
  /// same key produce exactly one row and exactly one `inserted == true`.
  fn upsert_visit(
    &self,
    ping: NormalizedPing,
  ) -> impl Future<Output = Result<VisitUpsert, Self::Error>> + Send + '_;

  fn get_visit(
    &self,
    session_id: String,
    company_id: String,
  ) -> impl Future<Output = Result<Option<VisitSession>, Self::Error>> + Send + '_;

  /// All visit rows for a company whose `visit_date` is `date`.
  fn visits_for_day(
    &self,
    company_id: String,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<VisitSession>, Self::Error>> + Send + '_;

  /// Total number of visit rows ever recorded for a company.
  fn count_visits(
    &self,
    company_id: String,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Daily rollups ─────────────────────────────────────────────────────

  /// Insert or replace the rollup keyed by `(company_id, date)`.
  fn put_daily_analytic(
    &self,
    analytic: DailyAnalytic,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_daily_analytic(
    &self,
    company_id: String,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<DailyAnalytic>, Self::Error>> + Send + '_;

  // ── Tags ──────────────────────────────────────────────────────────────

  /// Insert a tag unless the lead already has one of the same type.
  /// Returns the new tag, or `None` if one already existed. Atomic.
  fn insert_tag_if_absent(
    &self,
    tag: NewTag,
  ) -> impl Future<Output = Result<Option<Tag>, Self::Error>> + Send + '_;

  fn tags_for_lead(
    &self,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  // ── Sequence counter ──────────────────────────────────────────────────

  /// Allocate the next document number for `(company_id, kind)` inside its
  /// own serialised transaction. Concurrent callers never receive the same
  /// number and numbers are handed out without gaps.
  fn next_number(
    &self,
    company_id: String,
    kind: DocumentKind,
  ) -> impl Future<Output = Result<DocumentNumber, Self::Error>> + Send + '_;
}
