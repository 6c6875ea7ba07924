//! Typed views of the JSON objects returned by the model.
//!
//! Model output is never trusted as-is: each operation parses its reply into
//! one of these structs, dropping values of the wrong shape. Missing or
//! malformed keys come out as empty lists, `None`, or empty strings.

use serde_json::Value;

use crate::gateway::JsonObject;

/// Reply to a recommendation prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationResponse {
    pub recommendations: Vec<i64>,
}

impl RecommendationResponse {
    pub fn from_json(object: &JsonObject) -> Self {
        Self {
            recommendations: id_list(object.get("recommendations")),
        }
    }
}

/// Reply to a rating prediction prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingResponse {
    /// Predicted rating on the 0–10 scale. Out-of-range values are dropped.
    pub predicted_rating: Option<f64>,
}

impl RatingResponse {
    pub fn from_json(object: &JsonObject) -> Self {
        Self {
            predicted_rating: number(object.get("predicted_rating"))
                .filter(|rating| (0.0..=10.0).contains(rating)),
        }
    }
}

/// Reply to a free-text query prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub relevant_movies: Vec<i64>,
}

impl QueryResponse {
    pub fn from_json(object: &JsonObject) -> Self {
        Self {
            answer: text(object.get("answer")).unwrap_or_default(),
            relevant_movies: id_list(object.get("relevant_movies")),
        }
    }
}

/// Reply to a comparison prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonResponse {
    pub comparison: String,
    pub summary: Option<String>,
}

impl ComparisonResponse {
    pub fn from_json(object: &JsonObject) -> Self {
        Self {
            comparison: text(object.get("comparison")).unwrap_or_default(),
            summary: text(object.get("summary")),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A finite number, given either as a JSON number or a numeric string.
pub(crate) fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// An integer identifier, given as an integer, an integral float, or a
/// numeric string.
pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Identifiers from a JSON array; elements that are not identifiers are
/// skipped.
fn id_list(value: Option<&Value>) -> Vec<i64> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(integer).collect(),
        _ => Vec::new(),
    }
}

/// Text content. Non-string values are rendered as JSON, null is absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
