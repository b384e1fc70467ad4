//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the comment persistence port used by the services.
//! - Isolate SQLite query details from tree assembly and orchestration.
//!
//! # Invariants
//! - Repository APIs report absent rows as `None`, separately from transport
//!   errors.

pub mod comment_repo;
