//! Domain model for threaded comments.
//!
//! # Responsibility
//! - Define the canonical comment record and its in-memory tree shape.
//!
//! # Invariants
//! - Every comment is identified by a store-assigned positive `CommentId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod comment;
