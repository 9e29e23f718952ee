//! Error type for `pagefacts-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] pagefacts_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A `table_id` column held a value no storage class maps to.
  #[error("unknown storage class id: {0}")]
  UnknownStorageClass(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
