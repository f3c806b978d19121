//! Full-text side of search: FTS5 query building and bm25 ranking.

use sqlx::{FromRow, SqlitePool};

use crate::content::{ContentItem, ContentRow};
use crate::language::{self, Language};

use super::SearchError;

/// Opening highlight marker in excerpts.
pub const HIGHLIGHT_START: &str = "[";
/// Closing highlight marker in excerpts.
pub const HIGHLIGHT_END: &str = "]";

/// Tokens per FTS5 snippet.
const SNIPPET_TOKENS: u32 = 24;

/// An item matched by the full-text index.
#[derive(Debug)]
pub(crate) struct LexicalMatch {
    pub item: ContentItem,
    /// Normalized rank in `[0, 1)`.
    pub rank: f64,
    /// Highlighted fragment from the best-matching column.
    pub snippet: String,
}

#[derive(FromRow)]
struct LexicalRow {
    #[sqlx(flatten)]
    content: ContentRow,
    bm25: f64,
    snippet: Option<String>,
}

/// Builds an FTS5 query requiring every non-stop-word token of `query`.
///
/// Tokens are quoted so user input never reaches the FTS5 query syntax.
/// Returns `None` when nothing searchable remains.
#[must_use]
pub fn build_match_query(query: &str, language: Language) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in language::tokenize(query) {
        if language.is_stop_word(&token) || terms.contains(&token) {
            continue;
        }
        terms.push(token);
    }
    if terms.is_empty() {
        return None;
    }
    let quoted: Vec<String> = terms
        .iter()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    Some(quoted.join(" AND "))
}

/// Maps a raw bm25 score (lower is better, usually negative) into `[0, 1)`.
#[must_use]
pub fn normalize_bm25(bm25: f64) -> f64 {
    if !bm25.is_finite() {
        return 0.0;
    }
    let strength = (-bm25).max(0.0);
    strength / (1.0 + strength)
}

/// Runs `match_query` against the index.
pub(crate) async fn lexical_matches(
    pool: &SqlitePool,
    match_query: &str,
) -> Result<Vec<LexicalMatch>, SearchError> {
    let sql = format!(
        r"SELECT c.*,
                 bm25(content_fts) AS bm25,
                 snippet(content_fts, -1, '{HIGHLIGHT_START}', '{HIGHLIGHT_END}', '...', {SNIPPET_TOKENS}) AS snippet
          FROM content_fts
          JOIN content_items c ON c.seq = content_fts.rowid
          WHERE content_fts MATCH ?"
    );
    let rows = sqlx::query_as::<_, LexicalRow>(&sql)
        .bind(match_query)
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| -> Result<LexicalMatch, SearchError> {
            Ok(LexicalMatch {
                item: ContentItem::try_from(row.content)?,
                rank: normalize_bm25(row.bm25),
                snippet: row.snippet.unwrap_or_default(),
            })
        })
        .collect()
}
