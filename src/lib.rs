//! Typed client core for the `docker buildx` command-line tool.
//!
//! `buildkeeper` runs buildx as a subprocess and turns its loosely specified
//! text and JSON output into typed records and semantic errors. Known races in
//! buildx's on-disk state are retried under a deadline, and builders can be
//! polled until their first node reaches a status.
//!
//! # Modules
//!
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`decode`]: Output parsing and failure classification
//! - [`engine`]: The buildx client, its request types and executable resolution
//! - [`error`]: Semantic error types and their retry categories
//! - [`poll`]: Waiting for a builder to reach a status
//! - [`process`]: Subprocess execution with concurrent stream draining
//! - [`retry`]: Deadline-bounded retry of transient failures

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod poll;
pub mod process;
pub mod retry;
