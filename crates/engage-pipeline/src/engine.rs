//! [`Engine`]: primary writes and the derived effects they schedule.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use engage_core::{
  activity::{Action, ActivityInput, ActivityRecord},
  lead::Lead,
  rollup::DailyAnalytic,
  sequence::{DocumentKind, DocumentNumber},
  session::WorkSession,
  stage::{Stage, TransitionTable, Trigger},
  store::{EngagementStore, SessionStart},
  tag::{NewTag, Tag, TagType, tags_for_action, tags_for_visit},
  visit::{VisitPing, VisitSession},
};

use crate::{BackgroundTasks, EffectError, Error, PipelineConfig, Result};

/// Compare-and-set attempts before a contended stage update is abandoned.
const STAGE_CAS_ATTEMPTS: u32 = 3;

/// What applying a trigger did to a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
  Unchanged { stage: Stage },
  Advanced { from: Stage, to: Stage },
}

/// Result of ingesting one visit ping.
#[derive(Debug, Clone)]
pub struct VisitUpdate {
  pub visit:     VisitSession,
  /// `false` when this ping opened the visit session.
  pub is_update: bool,
}

/// A lead together with its tags.
#[derive(Debug, Clone, Serialize)]
pub struct LeadView {
  #[serde(flatten)]
  pub lead: Lead,
  pub tags: Vec<Tag>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
  value
    .map(|s| s.trim().to_owned())
    .filter(|s| !s.is_empty())
    .ok_or_else(|| Error::Validation(engage_core::Error::MissingFields(vec![field])))
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The engagement pipeline over an injected store.
///
/// Cloning is cheap; clones share the store, rule table and worker pool.
pub struct Engine<S> {
  store:  Arc<S>,
  table:  Arc<TransitionTable>,
  tasks:  BackgroundTasks,
  /// Serialises rollup read-compute-write cycles so an older snapshot can
  /// never overwrite a newer one.
  rollup: Arc<Mutex<()>>,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      table:  Arc::clone(&self.table),
      tasks:  self.tasks.clone(),
      rollup: Arc::clone(&self.rollup),
    }
  }
}

impl<S> Engine<S>
where
  S: EngagementStore + 'static,
{
  /// Build an engine and start its background workers. Must be called from
  /// within a tokio runtime.
  pub fn new(store: Arc<S>, config: &PipelineConfig) -> Self {
    Self {
      store,
      table: Arc::new(config.transition_table()),
      tasks: BackgroundTasks::start(config),
      rollup: Arc::new(Mutex::new(())),
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn tasks(&self) -> &BackgroundTasks { &self.tasks }

  /// Stop accepting derived effects and wait for queued ones to finish.
  pub async fn shutdown(&self) { self.tasks.shutdown().await }

  // ── Activity ledger ───────────────────────────────────────────────────────

  /// Append an agent action to the ledger, then schedule its stage and tag
  /// effects. Succeeds once the ledger write succeeds.
  pub async fn record_activity(&self, input: ActivityInput) -> Result<ActivityRecord> {
    let new = input.validate()?;
    let record = self
      .store
      .append_activity(new)
      .await
      .map_err(Error::persistence)?;

    tracing::info!(
      activity = %record.activity_id,
      lead = %record.lead_id,
      user = %record.user_name,
      action = %record.action,
      "activity recorded"
    );

    match record.known_action() {
      Some(action) => self.schedule_activity_effects(&record, action),
      None => tracing::debug!(action = %record.action, "unrecognised action; no derived effects"),
    }

    Ok(record)
  }

  fn schedule_activity_effects(&self, record: &ActivityRecord, action: Action) {
    let lead_id = record.lead_id;

    let trigger = Trigger::Activity(action);
    if self.table.reacts_to(trigger) {
      let engine = self.clone();
      self.tasks.submit(format!("stage:{lead_id}:{action}"), async move {
        engine.apply_trigger(lead_id, trigger).await.map(drop)
      });
    }

    if tags_for_action(action).next().is_some() {
      let engine = self.clone();
      let action_data = record.action_data.clone();
      self.tasks.submit(format!("tags:{lead_id}:{action}"), async move {
        engine
          .apply_action_tags(lead_id, action, &action_data)
          .await
          .map(drop)
      });
    }
  }

  pub async fn activities_for_lead(&self, lead_id: Uuid) -> Result<Vec<ActivityRecord>> {
    self
      .store
      .activities_for_lead(lead_id)
      .await
      .map_err(Error::persistence)
  }

  // ── Stage transitions ─────────────────────────────────────────────────────

  /// Move a lead along the transition table in response to `trigger`.
  ///
  /// The stage is read, the next stage computed, and the write made
  /// conditional on the stage still being the one read. A lost race re-reads
  /// and re-evaluates, so a concurrent advance is never overwritten by a rule
  /// whose guard no longer holds.
  pub async fn apply_trigger(
    &self,
    lead_id: Uuid,
    trigger: Trigger,
  ) -> Result<StageOutcome, EffectError> {
    for _ in 0..STAGE_CAS_ATTEMPTS {
      let lead = self
        .store
        .get_lead(lead_id)
        .await
        .map_err(EffectError::store)?
        .ok_or(EffectError::LeadNotFound(lead_id))?;

      let Some(next) = self.table.next(lead.stage, trigger) else {
        return Ok(StageOutcome::Unchanged { stage: lead.stage });
      };

      if self
        .store
        .compare_and_set_stage(lead_id, lead.stage, next)
        .await
        .map_err(EffectError::store)?
      {
        tracing::info!(lead = %lead_id, from = %lead.stage, to = %next, ?trigger, "stage advanced");
        return Ok(StageOutcome::Advanced { from: lead.stage, to: next });
      }

      tracing::debug!(lead = %lead_id, "stage changed concurrently; re-evaluating");
    }

    Err(EffectError::Contended { lead_id, attempts: STAGE_CAS_ATTEMPTS })
  }

  /// Operator override: assign any stage, bypassing the table.
  pub async fn set_stage(&self, lead_id: Uuid, stage: Stage) -> Result<Lead> {
    let lead = self
      .store
      .set_stage(lead_id, stage)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| Error::NotFound(format!("lead {lead_id}")))?;

    tracing::info!(lead = %lead_id, %stage, "stage set manually");
    Ok(lead)
  }

  // ── Auto-tagging ──────────────────────────────────────────────────────────

  /// Add the tags `action` maps to. Tags the lead already has are skipped.
  /// Returns only the tags that were newly added.
  pub async fn apply_action_tags(
    &self,
    lead_id: Uuid,
    action: Action,
    action_data: &serde_json::Value,
  ) -> Result<Vec<Tag>, EffectError> {
    let tags: Vec<TagType> = tags_for_action(action).collect();
    let metadata = json!({
      "trigger":     "activity",
      "action":      action.as_str(),
      "action_data": action_data,
    });
    self.insert_tags(lead_id, &tags, metadata).await
  }

  async fn insert_tags(
    &self,
    lead_id: Uuid,
    tags: &[TagType],
    metadata: serde_json::Value,
  ) -> Result<Vec<Tag>, EffectError> {
    if tags.is_empty() {
      return Ok(Vec::new());
    }
    if self
      .store
      .get_lead(lead_id)
      .await
      .map_err(EffectError::store)?
      .is_none()
    {
      return Err(EffectError::LeadNotFound(lead_id));
    }

    let mut added = Vec::new();
    for &tag_type in tags {
      let inserted = self
        .store
        .insert_tag_if_absent(NewTag::system(lead_id, tag_type, metadata.clone()))
        .await
        .map_err(EffectError::store)?;
      if let Some(tag) = inserted {
        tracing::info!(lead = %lead_id, tag = %tag_type, "tag added");
        added.push(tag);
      }
    }
    Ok(added)
  }

  // ── Visit sessions ────────────────────────────────────────────────────────

  /// Merge a telemetry ping into its visit session. The first ping of a
  /// session schedules the daily rollup and the visit's stage/tag effects;
  /// later pings only update the row.
  pub async fn ingest_visit(&self, ping: VisitPing) -> Result<VisitUpdate> {
    let ping = ping.normalize()?;
    let hinted_initial = ping.is_initial_hint;

    let upsert = self
      .store
      .upsert_visit(ping)
      .await
      .map_err(Error::persistence)?;
    let visit = upsert.visit;

    if upsert.inserted {
      tracing::info!(
        visit = %visit.visit_id,
        session = %visit.session_id,
        company = %visit.company_id,
        device = %visit.device_type,
        "visit session opened"
      );
      self.schedule_visit_effects(&visit);
    } else {
      if hinted_initial {
        tracing::debug!(session = %visit.session_id, "initial ping for an existing session");
      }
      tracing::trace!(
        session = %visit.session_id,
        total = visit.total_time_seconds,
        "visit session merged"
      );
    }

    Ok(VisitUpdate { is_update: !upsert.inserted, visit })
  }

  fn schedule_visit_effects(&self, visit: &VisitSession) {
    let company = visit.company_id.clone();
    let date = visit.visit_date;
    let engine = self.clone();
    self.tasks.submit(format!("rollup:{company}:{date}"), async move {
      engine.recompute_daily(&company, date).await?;
      Ok(())
    });

    let engine = self.clone();
    let visit = visit.clone();
    self.tasks.submit(
      format!("visit:{}:{}", visit.company_id, visit.session_id),
      async move { engine.visit_effects(&visit).await },
    );
  }

  /// Tags are judged against the stage the lead had when the visit arrived,
  /// so they are applied before the stage can move.
  async fn visit_effects(&self, visit: &VisitSession) -> Result<(), EffectError> {
    let Some(lead) = self
      .store
      .lead_for_company(visit.company_id.clone())
      .await
      .map_err(EffectError::store)?
    else {
      tracing::debug!(company = %visit.company_id, "visited company has no pipeline entry");
      return Ok(());
    };

    let prior_visits = self
      .store
      .count_visits(visit.company_id.clone())
      .await
      .map_err(EffectError::store)?
      .saturating_sub(1);

    let tags = tags_for_visit(lead.stage, prior_visits);
    let metadata = json!({
      "trigger":      "visit",
      "session_id":   visit.session_id,
      "template_key": visit.template_key,
      "stage":        lead.stage,
    });
    self.insert_tags(lead.lead_id, &tags, metadata).await?;
    self.apply_trigger(lead.lead_id, Trigger::FirstVisit).await?;
    Ok(())
  }

  pub async fn visit(&self, session_id: &str, company_id: &str) -> Result<Option<VisitSession>> {
    self
      .store
      .get_visit(session_id.to_owned(), company_id.to_owned())
      .await
      .map_err(Error::persistence)
  }

  // ── Daily rollup ──────────────────────────────────────────────────────────

  /// Rebuild the `(company, date)` rollup from that day's visit rows and
  /// store it, replacing any previous value.
  pub async fn recompute_daily(&self, company_id: &str, date: NaiveDate) -> Result<DailyAnalytic> {
    let _guard = self.rollup.lock().await;
    let visits = self
      .store
      .visits_for_day(company_id.to_owned(), date)
      .await
      .map_err(Error::persistence)?;

    let analytic = DailyAnalytic::compute(company_id, date, &visits);
    self
      .store
      .put_daily_analytic(analytic.clone())
      .await
      .map_err(Error::persistence)?;

    tracing::debug!(
      company = %company_id,
      %date,
      views = analytic.total_views,
      "daily rollup recomputed"
    );
    Ok(analytic)
  }

  pub async fn daily_analytic(
    &self,
    company_id: Option<String>,
    date: NaiveDate,
  ) -> Result<Option<DailyAnalytic>> {
    let company_id = required(company_id, "companyId")?;
    self
      .store
      .get_daily_analytic(company_id, date)
      .await
      .map_err(Error::persistence)
  }

  // ── Work sessions ─────────────────────────────────────────────────────────

  /// Open a work session, closing the agent's previous one if still open.
  pub async fn start_work_session(&self, user_name: Option<String>) -> Result<SessionStart> {
    let user_name = required(user_name, "userName")?;
    let start = self
      .store
      .start_work_session(user_name)
      .await
      .map_err(Error::persistence)?;

    tracing::info!(
      user = %start.started.user_name,
      session = %start.started.session_id,
      replaced = ?start.closed.as_ref().map(|s| s.session_id),
      "work session started"
    );
    Ok(start)
  }

  /// Close the agent's open session and stamp its counters. `None` if the
  /// agent had no open session.
  pub async fn end_work_session(&self, user_name: Option<String>) -> Result<Option<WorkSession>> {
    let user_name = required(user_name, "userName")?;
    let closed = self
      .store
      .end_work_session(user_name.clone())
      .await
      .map_err(Error::persistence)?;

    match &closed {
      Some(session) => tracing::info!(
        user = %user_name,
        session = %session.session_id,
        calls = session.stats.calls_made,
        leads = session.stats.leads_processed,
        "work session ended"
      ),
      None => tracing::debug!(user = %user_name, "no open work session to end"),
    }
    Ok(closed)
  }

  /// The agent's open work session, if any.
  pub async fn current_work_session(
    &self,
    user_name: Option<String>,
  ) -> Result<Option<WorkSession>> {
    let user_name = required(user_name, "userName")?;
    self
      .store
      .active_work_session(user_name)
      .await
      .map_err(Error::persistence)
  }

  // ── Sequence counter ──────────────────────────────────────────────────────

  /// Allocate the next invoice or estimate number for a company.
  pub async fn next_number(&self, company_id: &str, kind: DocumentKind) -> Result<DocumentNumber> {
    let company_id = required(Some(company_id.to_owned()), "companyId")?;
    self
      .store
      .next_number(company_id, kind)
      .await
      .map_err(|e| {
        tracing::error!(error = %e, %kind, "document number unavailable");
        Error::SequenceUnavailable(Box::new(e))
      })
  }

  // ── Leads ─────────────────────────────────────────────────────────────────

  pub async fn create_lead(&self, company_id: Option<String>, notes: Option<String>) -> Result<Lead> {
    let company_id = required(company_id, "companyId")?;

    let lead = self
      .store
      .create_lead(company_id.clone(), notes)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| {
        Error::Conflict(format!("company {company_id:?} already has a pipeline entry"))
      })?;
    tracing::info!(lead = %lead.lead_id, company = %lead.company_id, "lead created");
    Ok(lead)
  }

  pub async fn lead(&self, lead_id: Uuid) -> Result<LeadView> {
    let lead = self
      .store
      .get_lead(lead_id)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| Error::NotFound(format!("lead {lead_id}")))?;
    let tags = self
      .store
      .tags_for_lead(lead_id)
      .await
      .map_err(Error::persistence)?;
    Ok(LeadView { lead, tags })
  }
}
