//! SQLite backend for the engagement pipeline.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Concurrency guarantees come from
//! SQLite itself: `BEGIN IMMEDIATE` transactions for the sequence counter and
//! work sessions, and single-statement upserts for visits and tags.

mod encode;
mod schema;
mod store;

pub mod error;
pub mod sequence;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
