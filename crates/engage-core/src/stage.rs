//! Lead stages and the stage transition table.
//!
//! The table is data rather than control flow: each rule pairs a trigger with
//! the stages it may fire from and the stage it moves the lead to. Any
//! (trigger, stage) pair without a matching rule is a no-op, so a lead that
//! has already moved past a rule's source stage is never regressed.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result, activity::Action};

// ─── Stage ───────────────────────────────────────────────────────────────────

/// A lead's position in the sales pipeline.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
  #[default]
  NewLead,
  LiveCall,
  Voicemail,
  Unsuccessful,
  /// Legacy stage still assigned by the operator UI. No activity rule
  /// targets it; it is only reachable through a manual override.
  Contacted,
  WebsiteViewed,
  Appointment,
  SaleMade,
}

impl Stage {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownStage(s.to_owned()))
  }
}

// ─── Triggers and guards ─────────────────────────────────────────────────────

/// An event that may move a lead between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
  /// An agent action recorded in the activity ledger.
  Activity(Action),
  /// The first ping of a new visit session on the company's site.
  FirstVisit,
}

/// The set of current stages a rule may fire from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageGuard {
  Any,
  OneOf(Vec<Stage>),
}

impl StageGuard {
  pub fn admits(&self, stage: Stage) -> bool {
    match self {
      Self::Any => true,
      Self::OneOf(stages) => stages.contains(&stage),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
  pub trigger: Trigger,
  pub from:    StageGuard,
  pub to:      Stage,
}

impl TransitionRule {
  pub fn new(trigger: Trigger, from: StageGuard, to: Stage) -> Self {
    Self { trigger, from, to }
  }
}

// ─── Table ───────────────────────────────────────────────────────────────────

/// An ordered list of [`TransitionRule`]s. The first rule whose trigger and
/// guard both match decides the outcome.
#[derive(Debug, Clone)]
pub struct TransitionTable {
  rules: Vec<TransitionRule>,
}

impl TransitionTable {
  pub fn new(rules: Vec<TransitionRule>) -> Self { Self { rules } }

  /// The production rule set.
  ///
  /// `visit_sources` lists the stages a first website visit advances to
  /// `website_viewed` from. Historically this was only `contacted`, a stage
  /// no activity rule produces, so it is left to configuration.
  pub fn standard(visit_sources: Vec<Stage>) -> Self {
    use Stage::*;
    Self::new(vec![
      TransitionRule::new(
        Trigger::Activity(Action::SmsAnswerCallSent),
        StageGuard::OneOf(vec![NewLead]),
        LiveCall,
      ),
      TransitionRule::new(
        Trigger::Activity(Action::SmsVoicemail1Sent),
        StageGuard::OneOf(vec![NewLead]),
        Voicemail,
      ),
      TransitionRule::new(
        Trigger::Activity(Action::UnsuccessfulCallMarked),
        StageGuard::Any,
        Unsuccessful,
      ),
      TransitionRule::new(
        Trigger::FirstVisit,
        StageGuard::OneOf(visit_sources),
        WebsiteViewed,
      ),
    ])
  }

  pub fn rules(&self) -> &[TransitionRule] { &self.rules }

  /// Whether any rule fires on `trigger` at all, from some stage.
  pub fn reacts_to(&self, trigger: Trigger) -> bool {
    self.rules.iter().any(|rule| rule.trigger == trigger)
  }

  /// The stage `current` moves to under `trigger`, or `None` when the pair is
  /// a no-op. A rule whose target equals the current stage is also a no-op,
  /// which makes applying the same trigger twice idempotent.
  pub fn next(&self, current: Stage, trigger: Trigger) -> Option<Stage> {
    self
      .rules
      .iter()
      .find(|rule| rule.trigger == trigger && rule.from.admits(current))
      .map(|rule| rule.to)
      .filter(|to| *to != current)
  }
}

impl Default for TransitionTable {
  fn default() -> Self { Self::standard(vec![Stage::Contacted]) }
}
