//! Movie enrichment: derived sentiment, tiers, effectiveness and audience.
//!
//! Each movie gets one [`Enrichment`] record. With a configured gateway the
//! model is asked for the five fields; otherwise, or when the call fails,
//! [`heuristic_enrichment`] computes them from budget, revenue and overview.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::format_dollars;
use crate::gateway::{Gateway, JsonObject};
use crate::responses::number;
use crate::store::Movie;

/// Sampling temperature for enrichment prompts.
pub const ENRICHMENT_TEMPERATURE: f32 = 0.3;

/// Audience assigned by the heuristic.
pub const DEFAULT_AUDIENCE: &str = "Adults";

const HIGH_BUDGET: f64 = 50_000_000.0;
const MEDIUM_BUDGET: f64 = 10_000_000.0;
const HIGH_REVENUE: f64 = 100_000_000.0;
const MEDIUM_REVENUE: f64 = 20_000_000.0;

// ============================================================================
// Data Model
// ============================================================================

/// Sentiment of a movie overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    /// Case-insensitive parse. Unknown labels give `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Low / medium / high bucket for budget and revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Case-insensitive parse. Unknown labels give `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn for_budget(budget: f64) -> Self {
        Self::bucket(budget, HIGH_BUDGET, MEDIUM_BUDGET)
    }

    pub fn for_revenue(revenue: f64) -> Self {
        Self::bucket(revenue, HIGH_REVENUE, MEDIUM_REVENUE)
    }

    fn bucket(amount: f64, high: f64, medium: f64) -> Self {
        if amount > high {
            Self::High
        } else if amount > medium {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived metadata for one movie, stored in `movie_enrichment`.
///
/// Every field is optional: a missing value is written as NULL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub sentiment: Option<Sentiment>,
    pub budget_tier: Option<Tier>,
    pub revenue_tier: Option<Tier>,
    /// Nominally 0–100.
    pub effectiveness_score: Option<f64>,
    pub target_audience: Option<String>,
    /// Not produced by any current flow.
    pub content_rating: Option<String>,
}

impl Enrichment {
    /// Read the enrichment fields out of a model reply.
    ///
    /// Labels outside the known sets and non-numeric scores are dropped.
    /// Scores are clamped to 0–100.
    pub fn from_response(object: &JsonObject) -> Self {
        Self {
            sentiment: label(object, "sentiment").and_then(Sentiment::parse),
            budget_tier: label(object, "budget_tier").and_then(Tier::parse),
            revenue_tier: label(object, "revenue_tier").and_then(Tier::parse),
            effectiveness_score: number(object.get("effectiveness_score"))
                .map(|score| score.clamp(0.0, 100.0)),
            target_audience: label(object, "target_audience")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            content_rating: label(object, "content_rating").map(str::to_string),
        }
    }

    /// Fill any field the model left out from `fallback`.
    pub fn or_fallback(self, fallback: Enrichment) -> Self {
        Self {
            sentiment: self.sentiment.or(fallback.sentiment),
            budget_tier: self.budget_tier.or(fallback.budget_tier),
            revenue_tier: self.revenue_tier.or(fallback.revenue_tier),
            effectiveness_score: self.effectiveness_score.or(fallback.effectiveness_score),
            target_audience: self.target_audience.or(fallback.target_audience),
            content_rating: self.content_rating.or(fallback.content_rating),
        }
    }
}

fn label<'a>(object: &'a JsonObject, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

// ============================================================================
// Heuristic
// ============================================================================

/// Deterministic enrichment from budget, revenue and overview.
///
/// Sentiment is "positive" when the overview mentions "love" and "neutral"
/// otherwise; the heuristic never yields "negative".
pub fn heuristic_enrichment(movie: &Movie) -> Enrichment {
    let budget = movie.budget();
    let revenue = movie.revenue();

    let sentiment = if movie.overview().to_lowercase().contains("love") {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    };

    Enrichment {
        sentiment: Some(sentiment),
        budget_tier: Some(Tier::for_budget(budget)),
        revenue_tier: Some(Tier::for_revenue(revenue)),
        effectiveness_score: Some(effectiveness_score(budget, revenue)),
        target_audience: Some(DEFAULT_AUDIENCE.to_string()),
        content_rating: None,
    }
}

/// `revenue / max(budget, 1) * 10`, clamped to 0–100.
pub fn effectiveness_score(budget: f64, revenue: f64) -> f64 {
    (revenue / budget.max(1.0) * 10.0).clamp(0.0, 100.0)
}

// ============================================================================
// LLM Enrichment
// ============================================================================

/// Build the enrichment prompt for one movie.
pub fn enrichment_prompt(movie: &Movie) -> String {
    let budget = format_dollars(movie.budget());
    let revenue = format_dollars(movie.revenue());
    format!(
        r#"Analyze this movie and return JSON with exactly these 5 attributes:
1. sentiment: sentiment of overview (positive/negative/neutral)
2. budget_tier: categorize budget (low/medium/high) - budget is {budget}
3. revenue_tier: categorize revenue (low/medium/high) - revenue is {revenue}
4. effectiveness_score: production effectiveness (0-100) based on budget, revenue, and quality
5. target_audience: primary target audience (e.g., "Family", "Adults", "Teens")

Movie: {title}
Overview: {overview}
Budget: {budget}
Revenue: {revenue}
Genres: {genres}

Return only valid JSON: {{"sentiment": "...", "budget_tier": "...", "revenue_tier": "...", "effectiveness_score": 0-100, "target_audience": "..."}}"#,
        title = movie.title(),
        overview = movie.overview(),
        genres = movie.genres(),
    )
}

/// Enrich one movie through the gateway, falling back to the heuristic.
///
/// An inert gateway or a failed call yields the heuristic record. A reply
/// that omits fields has them filled from the heuristic.
pub async fn enrich_movie(gateway: &Gateway, movie: &Movie) -> Enrichment {
    let fallback = heuristic_enrichment(movie);
    match gateway
        .request(&enrichment_prompt(movie), ENRICHMENT_TEMPERATURE)
        .await
    {
        Some(object) => Enrichment::from_response(&object).or_fallback(fallback),
        None => fallback,
    }
}

// ============================================================================
// Tests
// ============================================================================
