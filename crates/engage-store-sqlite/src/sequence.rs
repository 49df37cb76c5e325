//! Per-company document numbering.
//!
//! [`allocate`] runs inside a caller-supplied transaction so a document row
//! and its number commit or roll back together. That transaction must be
//! opened with `BEGIN IMMEDIATE`; the write lock is what keeps two
//! allocations from reading the same value. Prefer
//! [`crate::SqliteStore::transaction_with_number`], which also reports
//! failures as [`crate::Error::SequenceUnavailable`].

use chrono::Utc;
use engage_core::sequence::{DEFAULT_START, DocumentKind, DocumentNumber};
use rusqlite::{Transaction, params};

use crate::encode::encode_dt;

/// Take the next number for `(company_id, kind)` and advance the counter.
///
/// A company's first allocation creates its counter at
/// [`DEFAULT_START`]. Nothing is consumed unless the transaction commits.
pub fn allocate(
  tx: &Transaction<'_>,
  company_id: &str,
  kind: DocumentKind,
) -> rusqlite::Result<DocumentNumber> {
  let now = encode_dt(Utc::now());

  tx.execute(
    "INSERT INTO sequence_counters (company_id, kind, next_number, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (company_id, kind) DO NOTHING",
    params![company_id, kind.as_str(), DEFAULT_START as i64, now],
  )?;

  let current: i64 = tx.query_row(
    "SELECT next_number FROM sequence_counters WHERE company_id = ?1 AND kind = ?2",
    params![company_id, kind.as_str()],
    |row| row.get(0),
  )?;

  tx.execute(
    "UPDATE sequence_counters
        SET next_number = next_number + 1, updated_at = ?3
      WHERE company_id = ?1 AND kind = ?2",
    params![company_id, kind.as_str(), now],
  )?;

  Ok(DocumentNumber { kind, number: current as u64 })
}
