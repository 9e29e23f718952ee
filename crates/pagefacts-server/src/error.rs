//! Error type for the server library.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot read {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid page document {path}: {source}")]
  PageDocument {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Core(#[from] pagefacts_core::Error),

  #[error("store error: {0}")]
  Store(#[from] pagefacts_store_sqlite::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
