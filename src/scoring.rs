//! Text matching and relevance scoring.
//!
//! Everything here is pure: no I/O, no cache access. The search engine
//! fetches content and hands plain strings to these functions.
//!
//! # Tokens
//!
//! A token is a maximal run of alphanumeric or `_` characters after
//! lowercasing. Token lists keep first-occurrence order and drop repeats, so
//! joining a query's tokens with spaces gives a stable phrase.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::Block;

/// Share of query tokens that must appear in content for a token match.
pub const CONTENT_TOKEN_THRESHOLD: f64 = 0.7;
/// Content relevance for a literal phrase hit.
pub const CONTENT_PHRASE_SCORE: f64 = 0.9;
/// Scale applied to token overlap in content relevance.
pub const CONTENT_OVERLAP_WEIGHT: f64 = 0.8;
/// Scale applied to token overlap in path relevance.
pub const PATH_WEIGHT: f64 = 0.8;

static SPECIFIC_TERMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(password|credential|config|setup|template)\b").unwrap());
static EMAIL_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+@\w+\.\w+\b").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap());

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercased, de-duplicated word tokens in first-occurrence order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = HashSet::new();
    lower
        .split(|c: char| !is_word_char(c))
        .filter(|w| !w.is_empty())
        .filter(|w| seen.insert(*w))
        .map(str::to_string)
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

fn overlap(query_tokens: &[String], other: &HashSet<String>) -> usize {
    query_tokens.iter().filter(|t| other.contains(*t)).count()
}

/// Whether a query is specific enough to justify reading page content.
///
/// True when any holds: three or more words; a quote, colon or equals sign;
/// one of the terms password/credential/config/setup/template as a whole
/// word; an email-like pattern; an ISO-date-like pattern.
pub fn is_specific_query(query: &str) -> bool {
    query.split_whitespace().count() >= 3
        || query.contains(['"', '\'', ':', '='])
        || SPECIFIC_TERMS.is_match(&query.to_lowercase())
        || EMAIL_LIKE.is_match(query)
        || ISO_DATE.is_match(query)
}

/// Whether content matches a query: literal case-insensitive substring, or at
/// least 70% of the query's tokens present in the content.
pub fn content_matches_query(query: &str, content: &str) -> bool {
    let query_lower = query.to_lowercase();
    let content_lower = content.to_lowercase();
    if content_lower.contains(&query_lower) {
        return true;
    }

    let query_tokens = tokenize(&query_lower);
    if query_tokens.is_empty() {
        return false;
    }
    let content_tokens = token_set(&content_lower);
    let hits = overlap(&query_tokens, &content_tokens);
    hits as f64 >= query_tokens.len() as f64 * CONTENT_TOKEN_THRESHOLD
}

/// Title relevance in `[0, 1]`: 1.0 when the query phrase appears in the
/// title, otherwise the fraction of query tokens found among title tokens.
pub fn title_relevance(query_tokens: &[String], title: &str) -> f64 {
    let title_tokens = token_set(title);
    if query_tokens.is_empty() || title_tokens.is_empty() {
        return 0.0;
    }

    if title.to_lowercase().contains(&query_tokens.join(" ")) {
        return 1.0;
    }

    overlap(query_tokens, &title_tokens) as f64 / query_tokens.len() as f64
}

/// Path relevance in `[0, 0.8]`: token overlap against the space-joined path.
pub fn path_relevance(query_tokens: &[String], path: &[String]) -> f64 {
    let path_tokens = token_set(&path.join(" "));
    if query_tokens.is_empty() || path_tokens.is_empty() {
        return 0.0;
    }
    overlap(query_tokens, &path_tokens) as f64 / query_tokens.len() as f64 * PATH_WEIGHT
}

/// Content relevance: 0.9 for a literal phrase hit, else 0.8 × token overlap.
pub fn content_relevance(query: &str, content: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let content_lower = content.to_lowercase();
    if content_lower.contains(&query_lower) {
        return CONTENT_PHRASE_SCORE;
    }

    let query_tokens = tokenize(&query_lower);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens = token_set(&content_lower);
    overlap(&query_tokens, &content_tokens) as f64 / query_tokens.len() as f64
        * CONTENT_OVERLAP_WEIGHT
}

/// Join the plain text of every block that carries rich text, trimming each
/// segment and skipping empty ones.
pub fn extract_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(Block::plain_text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `max_chars` characters, with `...` appended when truncated.
pub fn leading_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let mut s: String = text.chars().take(max_chars).collect();
        s.push_str("...");
        s
    } else {
        text.to_string()
    }
}

/// Per-character lowercase that keeps a 1:1 mapping to the original chars.
fn fold_chars(s: &str) -> Vec<char> {
    s.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Preview window around the first match of the query in `content`.
///
/// Looks for the whole query first, then each query word in order, and
/// falls back to a leading slice of `max_len` characters. The window spans
/// `half_width` characters either side of the match (at most `max_len / 2`)
/// and carries `...` on each truncated side.
pub fn snippet(query: &str, content: &str, half_width: usize, max_len: usize) -> String {
    let original: Vec<char> = content.chars().collect();
    let folded = fold_chars(content);

    let pos = find_chars(&folded, &fold_chars(query)).or_else(|| {
        tokenize(query)
            .iter()
            .find_map(|word| find_chars(&folded, &fold_chars(word)))
    });

    let Some(pos) = pos else {
        return leading_preview(content, max_len);
    };

    let half = half_width.min(max_len / 2);
    let start = pos.saturating_sub(half);
    let end = (pos + half).min(original.len());

    let mut preview = String::new();
    if start > 0 {
        preview.push_str("...");
    }
    preview.extend(&original[start..end]);
    if end < original.len() {
        preview.push_str("...");
    }
    preview
}
