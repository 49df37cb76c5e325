//! The engagement pipeline engine.
//!
//! [`Engine`] owns the primary writes (activity ledger, visit sessions, work
//! sessions, document numbers) and hands the effects derived from them
//! (stage transitions, auto-tags, daily rollups) to [`BackgroundTasks`]. A
//! primary write that succeeds is reported as a success no matter what
//! happens to its derived effects afterwards.

mod config;
mod engine;
mod error;
mod tasks;

pub use config::PipelineConfig;
pub use engine::{Engine, LeadView, StageOutcome, VisitUpdate};
pub use error::{EffectError, Error, Result};
pub use tasks::{BackgroundTasks, DEAD_LETTER_TARGET, DeadLetter};
