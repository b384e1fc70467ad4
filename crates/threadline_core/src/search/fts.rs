//! SQLite search implementation for comments.
//!
//! # Responsibility
//! - Provide keyword search over comment content and author.
//! - Provide the substring scan used when the FTS5 index is unusable.
//!
//! # Invariants
//! - Only non-deleted comments are returned.
//! - Result ordering is deterministic: rank (full-text only), then
//!   `created_at DESC, id DESC`.

use crate::model::comment::Comment;
use crate::repo::comment_repo::{parse_comment_row, StoreError, StoreResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// Runs an FTS5 `MATCH` query. Every whitespace-separated term must match.
///
/// A missing index or an expression FTS5 rejects is reported as
/// [`StoreError::SearchUnavailable`] so callers can degrade.
pub fn search_full_text(
    conn: &Connection,
    text: &str,
    limit: u32,
    offset: u32,
) -> StoreResult<Vec<Comment>> {
    let Some(match_expr) = build_match_expression(text) else {
        return Ok(Vec::new());
    };
    if limit == 0 {
        return Ok(Vec::new());
    }

    let sql = "SELECT
            c.id AS id,
            c.parent_id AS parent_id,
            c.author AS author,
            c.content AS content,
            c.created_at AS created_at,
            c.updated_at AS updated_at,
            c.is_deleted AS is_deleted
         FROM comments_fts
         JOIN comments c ON c.id = comments_fts.rowid
         WHERE comments_fts MATCH ?
           AND c.is_deleted = 0
         ORDER BY bm25(comments_fts), c.created_at DESC, c.id DESC
         LIMIT ? OFFSET ?";
    let bind_values = vec![
        Value::Text(match_expr.clone()),
        Value::Integer(i64::from(limit)),
        Value::Integer(i64::from(offset)),
    ];

    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| map_query_error(err, &match_expr))?;
    let mut rows = stmt
        .query(params_from_iter(bind_values))
        .map_err(|err| map_query_error(err, &match_expr))?;
    let mut comments = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|err| map_query_error(err, &match_expr))?
    {
        comments.push(parse_comment_row(row)?);
    }
    Ok(comments)
}

/// Case-insensitive substring match over content and author.
pub fn search_substring(
    conn: &Connection,
    text: &str,
    limit: u32,
    offset: u32,
) -> StoreResult<Vec<Comment>> {
    let needle = text.trim();
    if needle.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let pattern = format!("%{}%", escape_like(needle));
    let mut stmt = conn.prepare(
        "SELECT
            id,
            parent_id,
            author,
            content,
            created_at,
            updated_at,
            is_deleted
         FROM comments
         WHERE is_deleted = 0
           AND (content LIKE ?1 ESCAPE '\\' OR author LIKE ?1 ESCAPE '\\')
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let mut rows = stmt.query(params_from_iter([
        Value::Text(pattern),
        Value::Integer(i64::from(limit)),
        Value::Integer(i64::from(offset)),
    ]))?;
    let mut comments = Vec::new();
    while let Some(row) = rows.next()? {
        comments.push(parse_comment_row(row)?);
    }
    Ok(comments)
}

fn build_match_expression(text: &str) -> Option<String> {
    let terms = text
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();
    if terms.is_empty() {
        return None;
    }
    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn map_query_error(err: rusqlite::Error, query: &str) -> StoreError {
    if is_index_unavailable(&err) {
        return StoreError::SearchUnavailable(format!("query `{query}`: {err}"));
    }
    StoreError::from(err)
}

fn is_index_unavailable(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            msg.contains("no such table: comments_fts")
                || msg.contains("no such module: fts5")
                || (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{build_match_expression, escape_like};

    #[test]
    fn match_expression_quotes_and_joins_terms() {
        assert_eq!(
            build_match_expression("  rust   \"tree\" ").as_deref(),
            Some("\"rust\" AND \"\"\"tree\"\"\"")
        );
        assert!(build_match_expression("   ").is_none());
    }

    #[test]
    fn like_escape_protects_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
