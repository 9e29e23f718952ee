//! Core types and algorithms for the pagefacts schema-driven fact store.
//!
//! A schema document plus a page's JSON data is flattened into path-addressed
//! scalar facts; backends persist them per storage class and answer bracket
//! queries by joining facts back together. This crate is free of database
//! and HTTP dependencies.

// Native `async fn` in traits; the `Send` bounds are spelled out on the
// returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod flatten;
pub mod page;
pub mod path;
pub mod plan;
pub mod query;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{Error, Result};
