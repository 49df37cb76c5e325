//! [`SqliteStore`], the SQLite implementation of [`EngagementStore`].

use std::{path::Path, time::Duration};

use chrono::{NaiveDate, Utc};
use rusqlite::{
  ErrorCode, OptionalExtension as _, Transaction, TransactionBehavior, params,
};
use uuid::Uuid;

use engage_core::{
  activity::{ActivityRecord, NewActivity},
  lead::Lead,
  rollup::DailyAnalytic,
  sequence::{DocumentKind, DocumentNumber},
  session::{WorkSession, WorkSessionStats},
  stage::Stage,
  store::{EngagementStore, SessionStart},
  tag::{NewTag, Tag},
  visit::{NormalizedPing, VisitSession, VisitTotals, VisitUpsert},
};

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_COLUMNS, LEAD_COLUMNS, RawActivity, RawDailyAnalytic, RawLead,
    RawTag, RawVisit, RawWorkSession, TAG_COLUMNS, VISIT_COLUMNS,
    WORK_SESSION_COLUMNS, encode_date, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  sequence,
};

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// An engagement store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Several
/// stores may open the same file; writes that need serialising take the
/// database write lock up front with `BEGIN IMMEDIATE`.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on success
  /// and rolling back on any error.
  pub async fn transaction<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
  {
    Ok(self.immediate(f).await?)
  }

  /// Allocate the next number for `(company_id, kind)` and run `f` with it
  /// in the same `BEGIN IMMEDIATE` transaction, so a document row and its
  /// number commit or roll back together.
  ///
  /// Any failure rolls everything back and is reported as
  /// [`Error::SequenceUnavailable`]; no number is consumed.
  pub async fn transaction_with_number<T, F>(
    &self,
    company_id: &str,
    kind: DocumentKind,
    f: F,
  ) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>, DocumentNumber) -> rusqlite::Result<T> + Send + 'static,
  {
    let key = company_id.to_owned();

    self
      .immediate(move |tx| {
        let number = sequence::allocate(tx, &key, kind)?;
        f(tx, number)
      })
      .await
      .map_err(|source| {
        tracing::warn!(%company_id, %kind, error = %source, "sequence allocation failed");
        Error::SequenceUnavailable { company_id: company_id.to_owned(), kind, source }
      })
  }

  async fn immediate<T, F>(&self, f: F) -> tokio_rusqlite::Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
      })
      .await
  }

  async fn query_lead(&self, sql: String, key: String) -> Result<Option<Lead>> {
    let raw: Option<RawLead> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, params![key], RawLead::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawLead::into_lead).transpose()
  }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
  )
}

// ─── Work-session helpers (run inside a transaction) ─────────────────────────

fn open_session(
  tx: &Transaction<'_>,
  user_name: &str,
) -> rusqlite::Result<Option<RawWorkSession>> {
  tx.query_row(
    &format!(
      "SELECT {WORK_SESSION_COLUMNS} FROM work_sessions
        WHERE user_name = ?1 AND end_time IS NULL"
    ),
    params![user_name],
    RawWorkSession::from_row,
  )
  .optional()
}

fn session_stats(
  tx: &Transaction<'_>,
  session_id: &str,
) -> rusqlite::Result<WorkSessionStats> {
  let mut stmt =
    tx.prepare("SELECT lead_id, action FROM activity_log WHERE session_id = ?1")?;
  let rows = stmt
    .query_map(params![session_id], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(WorkSessionStats::tally(
    rows.iter().map(|(lead, action)| (lead.as_str(), action.as_str())),
  ))
}

/// Close the agent's open session, if any, stamping its counters.
fn close_open_session(
  tx: &Transaction<'_>,
  user_name: &str,
  now: &str,
) -> rusqlite::Result<Option<RawWorkSession>> {
  let Some(mut open) = open_session(tx, user_name)? else {
    return Ok(None);
  };

  let stats = session_stats(tx, &open.session_id)?;
  tx.execute(
    "UPDATE work_sessions
        SET end_time = ?2, leads_processed = ?3, calls_made = ?4,
            contacts_made = ?5, voicemails_left = ?6
      WHERE session_id = ?1",
    params![
      open.session_id,
      now,
      stats.leads_processed,
      stats.calls_made,
      stats.contacts_made,
      stats.voicemails_left,
    ],
  )?;

  open.end_time = Some(now.to_owned());
  open.stats = stats;
  Ok(Some(open))
}

// ─── EngagementStore impl ────────────────────────────────────────────────────

impl EngagementStore for SqliteStore {
  type Error = Error;

  // ── Leads ─────────────────────────────────────────────────────────────────

  async fn create_lead(&self, company_id: String, notes: Option<String>) -> Result<Option<Lead>> {
    let now = Utc::now();
    let lead = Lead {
      lead_id: Uuid::new_v4(),
      company_id,
      stage: Stage::NewLead,
      notes,
      created_at: now,
      updated_at: now,
    };

    let id_str     = encode_uuid(lead.lead_id);
    let company    = lead.company_id.clone();
    let stage_str  = lead.stage.as_str();
    let notes      = lead.notes.clone();
    let at_str     = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO leads (lead_id, company_id, stage, notes, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          params![id_str, company, stage_str, notes, at_str],
        ) {
          Ok(_) => Ok(true),
          Err(e) if is_constraint_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(inserted.then_some(lead))
  }

  async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>> {
    self
      .query_lead(
        format!("SELECT {LEAD_COLUMNS} FROM leads WHERE lead_id = ?1"),
        encode_uuid(lead_id),
      )
      .await
  }

  async fn lead_for_company(&self, company_id: String) -> Result<Option<Lead>> {
    self
      .query_lead(
        format!("SELECT {LEAD_COLUMNS} FROM leads WHERE company_id = ?1"),
        company_id,
      )
      .await
  }

  async fn set_stage(&self, lead_id: Uuid, stage: Stage) -> Result<Option<Lead>> {
    let id_str = encode_uuid(lead_id);
    let at_str = encode_dt(Utc::now());

    let raw: Option<RawLead> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "UPDATE leads SET stage = ?2, updated_at = ?3 WHERE lead_id = ?1
                 RETURNING {LEAD_COLUMNS}"
              ),
              params![id_str, stage.as_str(), at_str],
              RawLead::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawLead::into_lead).transpose()
  }

  async fn compare_and_set_stage(
    &self,
    lead_id:  Uuid,
    expected: Stage,
    next:     Stage,
  ) -> Result<bool> {
    let id_str = encode_uuid(lead_id);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE leads SET stage = ?3, updated_at = ?4
            WHERE lead_id = ?1 AND stage = ?2",
          params![id_str, expected.as_str(), next.as_str(), at_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  // ── Activity ledger (append-only) ────────────────────────────────────────

  async fn append_activity(&self, input: NewActivity) -> Result<ActivityRecord> {
    let record = ActivityRecord {
      activity_id: Uuid::new_v4(),
      session_id:  input.session_id,
      lead_id:     input.lead_id,
      company_id:  input.company_id,
      user_name:   input.user_name,
      action:      input.action,
      action_data: input.action_data,
      created_at:  Utc::now(),
    };

    let id_str      = encode_uuid(record.activity_id);
    let session_str = record.session_id.map(encode_uuid);
    let lead_str    = encode_uuid(record.lead_id);
    let company     = record.company_id.clone();
    let user        = record.user_name.clone();
    let action      = record.action.clone();
    let data_str    = record.action_data.to_string();
    let at_str      = encode_dt(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO activity_log (
             activity_id, session_id, lead_id, company_id,
             user_name, action, action_data, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          params![
            id_str,
            session_str,
            lead_str,
            company,
            user,
            action,
            data_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn activities_for_lead(&self, lead_id: Uuid) -> Result<Vec<ActivityRecord>> {
    let id_str = encode_uuid(lead_id);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACTIVITY_COLUMNS} FROM activity_log
            WHERE lead_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(params![id_str], RawActivity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_record).collect()
  }

  // ── Work sessions ─────────────────────────────────────────────────────────

  async fn start_work_session(&self, user_name: String) -> Result<SessionStart> {
    let now = Utc::now();
    let started = WorkSession {
      session_id: Uuid::new_v4(),
      user_name,
      start_time: now,
      end_time: None,
      stats: WorkSessionStats::default(),
    };

    let id_str = encode_uuid(started.session_id);
    let user   = started.user_name.clone();
    let at_str = encode_dt(now);

    let closed = self
      .immediate(move |tx| {
        let closed = close_open_session(tx, &user, &at_str)?;
        tx.execute(
          "INSERT INTO work_sessions (session_id, user_name, start_time)
           VALUES (?1, ?2, ?3)",
          params![id_str, user, at_str],
        )?;
        Ok(closed)
      })
      .await?;

    let closed = closed.map(RawWorkSession::into_session).transpose()?;
    if let Some(prev) = &closed {
      tracing::debug!(
        user = %prev.user_name,
        session = %prev.session_id,
        "closed stale work session before starting a new one"
      );
    }

    Ok(SessionStart { started, closed })
  }

  async fn end_work_session(&self, user_name: String) -> Result<Option<WorkSession>> {
    let at_str = encode_dt(Utc::now());

    let closed = self
      .immediate(move |tx| close_open_session(tx, &user_name, &at_str))
      .await?;

    closed.map(RawWorkSession::into_session).transpose()
  }

  async fn active_work_session(&self, user_name: String) -> Result<Option<WorkSession>> {
    let raw: Option<RawWorkSession> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {WORK_SESSION_COLUMNS} FROM work_sessions
                  WHERE user_name = ?1 AND end_time IS NULL"
              ),
              params![user_name],
              RawWorkSession::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawWorkSession::into_session).transpose()
  }

  // ── Visit sessions ────────────────────────────────────────────────────────

  async fn upsert_visit(&self, ping: NormalizedPing) -> Result<VisitUpsert> {
    let now   = Utc::now();
    let first = VisitTotals::first(ping.time_on_page, ping.interactions);

    let id_str   = encode_uuid(Uuid::new_v4());
    let at_str   = encode_dt(now);
    let date_str = encode_date(now.date_naive());

    // A fresh row has no end time; the first merge sets it. That makes
    // `visit_end_time IS NULL` in RETURNING report whether this statement
    // inserted. Interactions saturate at `u32::MAX` like `VisitTotals::merge`.
    let (raw, inserted): (RawVisit, bool) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO visit_sessions ({VISIT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13, 1)
             ON CONFLICT (session_id, company_id) DO UPDATE SET
               total_time_seconds = MIN(MAX(?14, total_time_seconds), 1800),
               page_interactions  = MIN(page_interactions + ?15, ?16),
               visit_end_time     = ?12
             RETURNING {VISIT_COLUMNS}, visit_end_time IS NULL"
          ),
          params![
            id_str,
            ping.session_id,
            ping.company_id,
            ping.company_slug,
            ping.template_key,
            ping.user_agent,
            ping.referrer,
            ping.device_type.as_str(),
            ping.browser_name,
            first.total_time_seconds,
            first.page_interactions,
            at_str,
            date_str,
            ping.time_on_page,
            ping.interactions,
            u32::MAX,
          ],
          |row| Ok((RawVisit::from_row(row)?, row.get(15)?)),
        )?)
      })
      .await?;

    Ok(VisitUpsert { visit: raw.into_visit()?, inserted })
  }

  async fn get_visit(
    &self,
    session_id: String,
    company_id: String,
  ) -> Result<Option<VisitSession>> {
    let raw: Option<RawVisit> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {VISIT_COLUMNS} FROM visit_sessions
                  WHERE session_id = ?1 AND company_id = ?2"
              ),
              params![session_id, company_id],
              RawVisit::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVisit::into_visit).transpose()
  }

  async fn visits_for_day(
    &self,
    company_id: String,
    date: NaiveDate,
  ) -> Result<Vec<VisitSession>> {
    let date_str = encode_date(date);

    let raws: Vec<RawVisit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VISIT_COLUMNS} FROM visit_sessions
            WHERE company_id = ?1 AND visit_date = ?2
            ORDER BY visit_start_time"
        ))?;
        let rows = stmt
          .query_map(params![company_id, date_str], RawVisit::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVisit::into_visit).collect()
  }

  async fn count_visits(&self, company_id: String) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM visit_sessions WHERE company_id = ?1",
          params![company_id],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(count.max(0) as u64)
  }

  // ── Daily rollups ─────────────────────────────────────────────────────────

  async fn put_daily_analytic(&self, analytic: DailyAnalytic) -> Result<()> {
    let date_str = encode_date(analytic.date);
    let at_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO daily_analytics (
             company_id, date, total_views, unique_sessions, mobile_percentage,
             total_time_seconds, top_referrer, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT (company_id, date) DO UPDATE SET
             total_views        = excluded.total_views,
             unique_sessions    = excluded.unique_sessions,
             mobile_percentage  = excluded.mobile_percentage,
             total_time_seconds = excluded.total_time_seconds,
             top_referrer       = excluded.top_referrer,
             updated_at         = excluded.updated_at",
          params![
            analytic.company_id,
            date_str,
            analytic.total_views,
            analytic.unique_sessions,
            analytic.mobile_percentage,
            analytic.total_time_seconds as i64,
            analytic.top_referrer,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn get_daily_analytic(
    &self,
    company_id: String,
    date: NaiveDate,
  ) -> Result<Option<DailyAnalytic>> {
    let date_str = encode_date(date);

    let raw: Option<RawDailyAnalytic> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT company_id, date, total_views, unique_sessions,
                      mobile_percentage, total_time_seconds, top_referrer
                 FROM daily_analytics WHERE company_id = ?1 AND date = ?2",
              params![company_id, date_str],
              |row| {
                Ok(RawDailyAnalytic {
                  company_id:         row.get(0)?,
                  date:               row.get(1)?,
                  total_views:        row.get(2)?,
                  unique_sessions:    row.get(3)?,
                  mobile_percentage:  row.get(4)?,
                  total_time_seconds: row.get(5)?,
                  top_referrer:       row.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDailyAnalytic::into_analytic).transpose()
  }

  // ── Tags ──────────────────────────────────────────────────────────────────

  async fn insert_tag_if_absent(&self, input: NewTag) -> Result<Option<Tag>> {
    let tag = Tag {
      tag_id:     Uuid::new_v4(),
      lead_id:    input.lead_id,
      tag_type:   input.tag_type,
      metadata:   input.metadata,
      created_by: input.created_by,
      created_at: Utc::now(),
    };

    let id_str   = encode_uuid(tag.tag_id);
    let lead_str = encode_uuid(tag.lead_id);
    let type_str = tag.tag_type.as_str();
    let meta_str = tag.metadata.to_string();
    let by       = tag.created_by.clone();
    let at_str   = encode_dt(tag.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO lead_tags (tag_id, lead_id, tag_type, metadata, created_by, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (lead_id, tag_type) DO NOTHING",
          params![id_str, lead_str, type_str, meta_str, by, at_str],
        )?)
      })
      .await?;

    Ok((inserted == 1).then_some(tag))
  }

  async fn tags_for_lead(&self, lead_id: Uuid) -> Result<Vec<Tag>> {
    let id_str = encode_uuid(lead_id);

    let raws: Vec<RawTag> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TAG_COLUMNS} FROM lead_tags WHERE lead_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(params![id_str], RawTag::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTag::into_tag).collect()
  }

  // ── Sequence counter ──────────────────────────────────────────────────────

  async fn next_number(
    &self,
    company_id: String,
    kind: DocumentKind,
  ) -> Result<DocumentNumber> {
    self
      .transaction_with_number(&company_id, kind, |_, number| Ok(number))
      .await
  }
}
