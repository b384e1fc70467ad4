//! Comment search.
//!
//! # Responsibility
//! - Expose SQLite query helpers backed by the FTS5 index and a substring
//!   scan.
//! - Provide the search adapter that validates queries, retries and degrades
//!   from full-text to substring matching.

pub mod adapter;
pub mod fts;
