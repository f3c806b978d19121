//! Excerpt helpers for hits without an FTS5 snippet.

use super::lexical::{HIGHLIGHT_END, HIGHLIGHT_START};

/// Length of the fallback excerpt, in characters.
pub const FALLBACK_EXCERPT_CHARS: usize = 200;

/// Characters of context kept before a substring match.
const SUBSTRING_CONTEXT_CHARS: usize = 60;

/// First [`FALLBACK_EXCERPT_CHARS`] characters of `body`, trimmed.
#[must_use]
pub fn prefix_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    let mut excerpt: String = trimmed.chars().take(FALLBACK_EXCERPT_CHARS).collect();
    if excerpt.len() < trimmed.len() {
        excerpt.push_str("...");
    }
    excerpt
}

/// Picks the FTS5 snippet when it highlights something, else the body prefix.
#[must_use]
pub fn choose_excerpt(snippet: Option<&str>, body: &str) -> String {
    match snippet {
        Some(snippet) if snippet.contains(HIGHLIGHT_START) && snippet.contains(HIGHLIGHT_END) => {
            snippet.to_string()
        }
        _ => prefix_excerpt(body),
    }
}

/// Window of `text` around the first case-insensitive occurrence of `needle`,
/// with the occurrence bracketed. `None` when `needle` does not occur.
#[must_use]
pub fn substring_excerpt(text: &str, needle: &str) -> Option<String> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }
    let chars: Vec<char> = text.chars().collect();
    let lowered: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();
    let start = lowered
        .windows(needle.len())
        .position(|window| window == needle.as_slice())?;
    let end = start + needle.len();

    let from = start.saturating_sub(SUBSTRING_CONTEXT_CHARS);
    let to = (end + FALLBACK_EXCERPT_CHARS - SUBSTRING_CONTEXT_CHARS).min(chars.len());

    let mut excerpt = String::new();
    if from > 0 {
        excerpt.push_str("...");
    }
    excerpt.extend(&chars[from..start]);
    excerpt.push_str(HIGHLIGHT_START);
    excerpt.extend(&chars[start..end]);
    excerpt.push_str(HIGHLIGHT_END);
    excerpt.extend(&chars[end..to]);
    if to < chars.len() {
        excerpt.push_str("...");
    }
    Some(excerpt)
}
