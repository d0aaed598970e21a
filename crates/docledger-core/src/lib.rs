//! # DocLedger Core
//!
//! Runtime-free logic for DocLedger: the versioned document model, the
//! hasher/chunker, the [`store::Store`] abstraction, and the algorithms that
//! run on top of it (search ranking, retrieval with citation freshness,
//! line diffs, and retention planning).
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Storage backends
//! live in the application crate; [`store::memory::InMemoryStore`] is
//! provided here for tests and embedding.

pub mod chunk;
pub mod diff;
pub mod error;
pub mod models;
pub mod query;
pub mod retention;
pub mod retrieval;
pub mod search;
pub mod store;
pub mod versions;

pub use error::{LedgerError, Result};
