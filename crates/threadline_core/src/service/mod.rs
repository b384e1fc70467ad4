//! Comment use-case services.
//!
//! # Responsibility
//! - Assemble nested threads, cascade soft deletes and orchestrate comment
//!   use cases over the comment store.
//! - Keep callers (CLI, future HTTP layer) decoupled from storage details.

pub mod cascade_deleter;
pub mod comment_service;
pub mod error;
pub mod tree_assembler;

/// Page size used when a caller passes `0`.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Normalizes a caller-provided page size.
pub fn normalize_page_limit(limit: u32) -> u32 {
    match limit {
        0 => DEFAULT_PAGE_LIMIT,
        value if value > MAX_PAGE_LIMIT => MAX_PAGE_LIMIT,
        value => value,
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_page_limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

    #[test]
    fn page_limit_defaults_and_clamps() {
        assert_eq!(normalize_page_limit(0), DEFAULT_PAGE_LIMIT);
        assert_eq!(normalize_page_limit(7), 7);
        assert_eq!(normalize_page_limit(MAX_PAGE_LIMIT + 1), MAX_PAGE_LIMIT);
    }
}
