//! SQLite backend for the pagefacts fact store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Facts live in one table per storage
//! class; queries are assembled with the typed builder in [`sql`].

mod encode;
mod query;
mod schema;
mod store;

pub mod error;
pub mod sql;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
