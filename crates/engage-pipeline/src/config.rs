//! Pipeline tuning knobs, deserialised from the server's config file.

use std::time::Duration;

use engage_core::stage::{Stage, TransitionTable};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Background workers draining the derived-effect queue.
  pub workers:              usize,
  /// Jobs the queue holds before new ones are dead-lettered.
  pub queue_capacity:       usize,
  pub effect_timeout_secs:  u64,
  /// Dead letters kept in memory; the oldest are dropped first.
  pub dead_letter_capacity: usize,
  /// Stages from which a lead's first website visit advances it to
  /// `website_viewed`.
  pub visit_advance_from:   Vec<Stage>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      workers:              4,
      queue_capacity:       1024,
      effect_timeout_secs:  10,
      dead_letter_capacity: 256,
      visit_advance_from:   vec![Stage::Contacted],
    }
  }
}

impl PipelineConfig {
  pub fn effect_timeout(&self) -> Duration { Duration::from_secs(self.effect_timeout_secs) }

  pub fn transition_table(&self) -> TransitionTable {
    TransitionTable::standard(self.visit_advance_from.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_config_keeps_defaults() {
    let cfg: PipelineConfig = serde_json::from_value(serde_json::json!({
      "workers": 2,
      "visit_advance_from": ["contacted", "voicemail"],
    }))
    .unwrap();

    assert_eq!(cfg.workers, 2);
    assert_eq!(cfg.queue_capacity, 1024);
    assert_eq!(cfg.visit_advance_from, vec![Stage::Contacted, Stage::Voicemail]);
    assert_eq!(cfg.effect_timeout(), Duration::from_secs(10));
  }

  #[test]
  fn unknown_stage_is_rejected() {
    let cfg = serde_json::from_value::<PipelineConfig>(serde_json::json!({
      "visit_advance_from": ["qualified"],
    }));
    assert!(cfg.is_err());
  }
}
