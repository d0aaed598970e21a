//! # DocLedger
//!
//! A local versioned document index: every content change to a file
//! appends a version, search and retrieval run over the latest (or, on
//! request, historical) versions, and a retention policy bounds how much
//! history is kept.
//!
//! The engines live in the runtime-free [`docledger_core`] crate. This crate
//! adds the SQLite store, the folder scanner, batch indexing, the CLI and
//! the HTTP tool server.
//!
//! # Architecture
//!
//! ```text
//! folders ──► connector_fs ──► ingest::index ──┐
//! editor save ─────────────────────────────────┤
//!                                              ▼
//!                         engine::Ledger (per-path locks)
//!                                              │
//!              ┌──────────────┬───────────────┼──────────────┬───────────┐
//!              ▼              ▼               ▼              ▼           ▼
//!           versions       search         retrieval        diff      retention
//!              └──────────────┴───── Store trait ──────────┴───────────┘
//!                                             │
//!                                       sqlite_store
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`locks`] | Per-path writer locks |
//! | [`engine`] | The `Ledger` facade every entry point goes through |
//! | [`connector_fs`] | Folder walking with glob exclusions |
//! | [`ingest`] | Batch indexing with bounded parallelism and cancellation |
//! | [`progress`] | Index progress reporting on stderr |
//! | [`tools`] | Tool trait and built-in tools |
//! | [`server`] | HTTP tool server |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod engine;
pub mod ingest;
pub mod locks;
pub mod migrate;
pub mod progress;
pub mod server;
pub mod sqlite_store;
pub mod tools;
