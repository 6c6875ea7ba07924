//! Movie Insight — movie catalog enrichment and LLM-assisted queries.
//!
//! Shared library for the demo binary and the operations CLI.

pub mod enrichment;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod responses;
pub mod store;
pub mod system;

use std::path::PathBuf;

/// Table holding the movie catalog.
pub const MOVIES_TABLE: &str = "movies";

/// Table holding user ratings.
pub const RATINGS_TABLE: &str = "ratings";

/// Table holding one enrichment row per movie.
pub const ENRICHMENT_TABLE: &str = "movie_enrichment";

/// Environment variable carrying the LLM credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Resolve the movies database path from env var or default location.
pub fn resolve_movies_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("MOVIE_INSIGHT_MOVIES_DB") {
        return PathBuf::from(path);
    }

    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("movie-insight").join("movies.db")
}

/// Resolve the ratings database path from env var or default location.
pub fn resolve_ratings_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("MOVIE_INSIGHT_RATINGS_DB") {
        return PathBuf::from(path);
    }

    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("movie-insight").join("ratings.db")
}

/// Read the API key from the environment, cleaned up by [`sanitize_api_key`].
pub fn resolve_api_key() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .and_then(|raw| sanitize_api_key(&raw))
}

/// Trim whitespace and one layer of matching surrounding quotes.
///
/// Keys pasted into shells often end up as `"sk-..."`. Returns `None` when
/// nothing usable is left.
pub fn sanitize_api_key(raw: &str) -> Option<String> {
    let mut key = raw.trim();
    for quote in ['"', '\''] {
        if key.len() >= 2 && key.starts_with(quote) && key.ends_with(quote) {
            key = key[1..key.len() - 1].trim();
        }
    }

    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Masked preview of a key: first 7 and last 4 characters.
pub fn key_preview(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Format a dollar amount with thousands separators, e.g. `$20,000,000`.
///
/// Fractions are rounded to whole dollars.
pub fn format_dollars(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

// ============================================================================
// Tests
// ============================================================================
