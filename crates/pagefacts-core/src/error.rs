//! Error types for `pagefacts-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid schema document: {0}")]
  InvalidSchema(String),

  #[error("schema not found: {0}")]
  SchemaNotFound(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
