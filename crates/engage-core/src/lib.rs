//! Core types, rule tables, and the storage trait for the engagement
//! pipeline.
//!
//! No HTTP, database or runtime dependencies. The stage machine, tag rules,
//! visit merge and daily rollup are pure functions over plain data and are
//! tested without a store.

pub mod activity;
pub mod device;
pub mod error;
pub mod lead;
pub mod rollup;
pub mod sequence;
pub mod session;
pub mod stage;
pub mod store;
pub mod tag;
pub mod visit;

pub use error::{Error, Result};
