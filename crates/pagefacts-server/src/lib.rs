//! HTTP server and maintenance tooling for pagefacts.
//!
//! Mounts the JSON API under `/api`, backed by a [`SqliteStore`] and a
//! directory of schema documents.

pub mod error;
pub mod rebuild;
pub mod schemas;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use pagefacts_api::{ApiState, api_router};
use pagefacts_core::{page::PageId, store::PageInvalidator};
use pagefacts_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PAGEFACTS_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
  /// Directory holding `<SchemaName>.json` documents.
  pub schema_dir: PathBuf,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 5280 }

// ─── Invalidation ─────────────────────────────────────────────────────────────

/// Reports pages whose rendered output went stale. Hosts without a render
/// cache only need the log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInvalidator;

impl PageInvalidator for LoggingInvalidator {
  fn invalidate(&self, page_id: PageId) {
    tracing::info!(page_id, "page output invalidated");
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server [`Router`]: the API under `/api` plus a health probe.
pub fn router(state: ApiState<SqliteStore>) -> Router {
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}

/// Wire a store and schema directory into API state.
pub fn app_state(store: SqliteStore, schema_dir: PathBuf) -> ApiState<SqliteStore> {
  ApiState {
    store:   Arc::new(store.with_invalidator(Arc::new(LoggingInvalidator))),
    schemas: Arc::new(schemas::DirSchemaSource::new(schema_dir)),
  }
}

// ─── Integration tests ────────────────────────────────────────────────────────
