//! The movie system: enrich, recommend, predict, query and compare.
//!
//! Each operation reads the store fresh, asks the gateway when one is
//! configured, and otherwise returns a heuristic or fixed default. Store
//! failures propagate; LLM failures never do.

use serde::Serialize;
use tracing::{debug, info};

use crate::enrichment::enrich_movie;
use crate::error::StoreError;
use crate::format_dollars;
use crate::gateway::Gateway;
use crate::responses::{ComparisonResponse, QueryResponse, RatingResponse, RecommendationResponse};
use crate::store::{Movie, MovieStore};

/// Rating returned whenever no prediction can be made.
pub const DEFAULT_PREDICTED_RATING: f64 = 7.5;

/// Criteria used by the demo when none are given.
pub const DEFAULT_COMPARISON_CRITERIA: &str = "budget, revenue, runtime";

pub const NOT_CONFIGURED_ANSWER: &str =
    "LLM not configured - set OPENAI_API_KEY environment variable";
pub const CALL_FAILED_ANSWER: &str = "LLM call failed - check API key and quota";
pub const NOT_CONFIGURED_COMPARISON: &str = "LLM not configured";
pub const NOT_CONFIGURED_SUMMARY: &str =
    "Set OPENAI_API_KEY environment variable for detailed comparison";
pub const CALL_FAILED_COMPARISON: &str = "LLM call failed";
pub const CALL_FAILED_SUMMARY: &str = "Check API key and quota";
pub const NO_SUMMARY: &str = "No summary available";

/// Movies fetched for recommendation and query.
const CATALOG_FETCH: usize = 200;
/// Movies fetched when looking up specific ids.
const LOOKUP_FETCH: usize = 1000;
/// Movies embedded in a prompt.
const PROMPT_SLICE: usize = 50;
/// Movies returned alongside a fallback answer.
const FALLBACK_MOVIES: usize = 5;

const RECOMMEND_TEMPERATURE: f32 = 0.5;
const PREDICT_TEMPERATURE: f32 = 0.2;
const QUERY_TEMPERATURE: f32 = 0.4;
const COMPARE_TEMPERATURE: f32 = 0.3;

/// Columns offered in the tabular view of a query answer.
const ANSWER_COLUMNS: [&str; 6] = ["title", "revenue", "budget", "runtime", "genres", "overview"];

// ============================================================================
// Result Types
// ============================================================================

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Model,
    NotConfigured,
    CallFailed,
}

/// Answer to a free-text query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub movies: Vec<Movie>,
    pub source: AnswerSource,
}

impl QueryAnswer {
    /// The display columns that are non-null in at least one returned movie.
    pub fn columns(&self) -> Vec<&'static str> {
        ANSWER_COLUMNS
            .into_iter()
            .filter(|column| {
                self.movies
                    .iter()
                    .any(|movie| movie.get(column).is_some_and(|v| !v.is_null()))
            })
            .collect()
    }
}

/// Result of comparing several movies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub comparison: String,
    pub summary: String,
    pub movies: Vec<Movie>,
    pub source: AnswerSource,
}

/// Narrowing applied to the catalog before a query is sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Case-insensitive substring of the genres column.
    pub genre: Option<String>,
    /// Minimum revenue in dollars.
    pub min_revenue: Option<f64>,
}

impl QueryOptions {
    fn matches(&self, movie: &Movie) -> bool {
        let genre_ok = self.genre.as_deref().is_none_or(|genre| {
            movie
                .genres()
                .to_lowercase()
                .contains(&genre.to_lowercase())
        });
        let revenue_ok = self
            .min_revenue
            .is_none_or(|min| movie.revenue() >= min);
        genre_ok && revenue_ok
    }
}

// ============================================================================
// Movie System
// ============================================================================

/// Façade over the store and the LLM gateway.
pub struct MovieSystem {
    store: MovieStore,
    gateway: Gateway,
}

impl MovieSystem {
    /// Build a system from an optional API key. A missing or blank key puts
    /// every operation in fallback mode.
    pub fn new(store: MovieStore, api_key: Option<&str>) -> Self {
        Self::with_gateway(store, Gateway::from_api_key(api_key))
    }

    pub fn with_gateway(store: MovieStore, gateway: Gateway) -> Self {
        Self { store, gateway }
    }

    /// Whether a credential was supplied. Fixed for the life of the system.
    pub fn has_api_key(&self) -> bool {
        self.gateway.is_configured()
    }

    pub fn store(&self) -> &MovieStore {
        &self.store
    }

    /// Enrich and persist the first `limit` movies. Returns how many were
    /// processed.
    pub async fn enrich_movies(&self, limit: usize) -> Result<usize, StoreError> {
        let movies = self.store.get_movies(limit)?;
        for movie in &movies {
            let enrichment = enrich_movie(&self.gateway, movie).await;
            self.store.update_movie_enrichment(movie.id(), &enrichment)?;
        }
        info!(count = movies.len(), "Enriched movies");
        Ok(movies.len())
    }

    /// Up to `limit` movies matching `query`.
    ///
    /// Without a gateway, or when the model names no movies, the first
    /// `limit` movies are returned unfiltered.
    pub async fn recommend(&self, query: &str, limit: usize) -> Result<Vec<Movie>, StoreError> {
        let movies = self.store.get_movies(CATALOG_FETCH)?;
        if !self.gateway.is_configured() {
            return Ok(first(movies, limit));
        }

        let prompt = format!(
            "Given these movies and user query, recommend top {limit} movies.\n\
             Query: {query}\n\
             Movies (JSON array): {slice}\n\
             Return JSON: {{\"recommendations\": [movieid1, movieid2, ...]}}",
            slice = movies_json(&movies[..movies.len().min(PROMPT_SLICE)]),
        );
        let response =
            RecommendationResponse::from_json(&self.gateway.call(&prompt, RECOMMEND_TEMPERATURE).await);

        if response.recommendations.is_empty() {
            debug!("No recommendations from model, returning unfiltered movies");
            return Ok(first(movies, limit));
        }

        Ok(movies
            .into_iter()
            .filter(|movie| response.recommendations.contains(&movie.id()))
            .take(limit)
            .collect())
    }

    /// Predicted 0–10 rating of a movie for a viewer with `preferences`.
    ///
    /// Returns [`DEFAULT_PREDICTED_RATING`] for unknown movies, without a
    /// gateway, or when the model gives no usable number.
    pub async fn predict_rating(&self, movie_id: i64, preferences: &str) -> Result<f64, StoreError> {
        let movie = self
            .store
            .get_movies(LOOKUP_FETCH)?
            .into_iter()
            .find(|movie| movie.id() == movie_id);

        let movie = match movie {
            Some(movie) if self.gateway.is_configured() => movie,
            _ => return Ok(DEFAULT_PREDICTED_RATING),
        };

        let rating_count = self.store.get_ratings(Some(movie_id))?.len();
        let preferences = if preferences.trim().is_empty() {
            "None"
        } else {
            preferences
        };
        let prompt = format!(
            "Predict rating (0-10) for this movie:\n\
             Movie: {title}\n\
             Overview: {overview}\n\
             Budget: {budget}\n\
             Revenue: {revenue}\n\
             Ratings: {rating_count}\n\
             Preferences: {preferences}\n\
             Return JSON: {{\"predicted_rating\": 0-10}}",
            title = movie.title(),
            overview = movie.overview(),
            budget = format_dollars(movie.budget()),
            revenue = format_dollars(movie.revenue()),
        );

        let response = RatingResponse::from_json(&self.gateway.call(&prompt, PREDICT_TEMPERATURE).await);
        Ok(response.predicted_rating.unwrap_or(DEFAULT_PREDICTED_RATING))
    }

    /// Answer a free-text question about the catalog.
    pub async fn query(&self, text: &str) -> Result<QueryAnswer, StoreError> {
        self.query_with_options(text, &QueryOptions::default()).await
    }

    /// Answer a free-text question over the movies matching `options`.
    ///
    /// Fallback answers carry the first five movies of the unfiltered fetch.
    pub async fn query_with_options(
        &self,
        text: &str,
        options: &QueryOptions,
    ) -> Result<QueryAnswer, StoreError> {
        let movies = self.store.get_movies(CATALOG_FETCH)?;
        if !self.has_api_key() {
            return Ok(QueryAnswer {
                answer: NOT_CONFIGURED_ANSWER.to_string(),
                movies: first(movies, FALLBACK_MOVIES),
                source: AnswerSource::NotConfigured,
            });
        }

        let candidates: Vec<&Movie> = movies.iter().filter(|m| options.matches(m)).collect();
        let slice: Vec<&Movie> = candidates.iter().take(PROMPT_SLICE).copied().collect();
        let prompt = format!(
            "Answer this query: {text}\n\
             Movies: {slice}\n\
             Return JSON: {{\"answer\": \"...\", \"relevant_movies\": [movieid1, ...]}}",
            slice = movies_json(&slice),
        );

        let result = self.gateway.call(&prompt, QUERY_TEMPERATURE).await;
        if result.is_empty() {
            return Ok(QueryAnswer {
                answer: CALL_FAILED_ANSWER.to_string(),
                movies: first(movies, FALLBACK_MOVIES),
                source: AnswerSource::CallFailed,
            });
        }

        let response = QueryResponse::from_json(&result);
        let relevant = candidates
            .into_iter()
            .filter(|movie| response.relevant_movies.contains(&movie.id()))
            .cloned()
            .collect();
        Ok(QueryAnswer {
            answer: response.answer,
            movies: relevant,
            source: AnswerSource::Model,
        })
    }

    /// Compare the given movies on `criteria`.
    pub async fn compare_movies(
        &self,
        movie_ids: &[i64],
        criteria: &str,
    ) -> Result<Comparison, StoreError> {
        let movies: Vec<Movie> = self
            .store
            .get_movies(LOOKUP_FETCH)?
            .into_iter()
            .filter(|movie| movie_ids.contains(&movie.id()))
            .collect();

        if !self.has_api_key() {
            return Ok(Comparison {
                comparison: NOT_CONFIGURED_COMPARISON.to_string(),
                summary: NOT_CONFIGURED_SUMMARY.to_string(),
                movies,
                source: AnswerSource::NotConfigured,
            });
        }

        let prompt = format!(
            "Compare these movies on: {criteria}\n\
             Movies: {movies}\n\
             Return JSON: {{\"comparison\": \"...\", \"summary\": \"...\"}}",
            movies = movies_json(&movies),
        );

        let result = self.gateway.call(&prompt, COMPARE_TEMPERATURE).await;
        if result.is_empty() {
            return Ok(Comparison {
                comparison: CALL_FAILED_COMPARISON.to_string(),
                summary: CALL_FAILED_SUMMARY.to_string(),
                movies,
                source: AnswerSource::CallFailed,
            });
        }

        let response = ComparisonResponse::from_json(&result);
        Ok(Comparison {
            comparison: response.comparison,
            summary: response.summary.unwrap_or_else(|| NO_SUMMARY.to_string()),
            movies,
            source: AnswerSource::Model,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn first(mut movies: Vec<Movie>, limit: usize) -> Vec<Movie> {
    movies.truncate(limit);
    movies
}

/// JSON array text of movies for embedding in a prompt.
fn movies_json<T: Serialize>(movies: &[T]) -> String {
    serde_json::to_string(movies).unwrap_or_else(|_| "[]".to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::enrichment::{Sentiment, Tier, heuristic_enrichment};
    use crate::gateway::{QUOTA_NOTICE, RecordingNotices};
    use crate::llm::{LlmClient, LlmError, MockLlmClient};
    use crate::store::{create_test_store, insert_orphan_movie};

    fn unauthorized() -> LlmError {
        LlmError::Api {
            status: 401,
            message: "Incorrect API key provided: sk-bad".into(),
        }
    }

    fn quota() -> LlmError {
        LlmError::Api {
            status: 429,
            message: "You exceeded your current quota".into(),
        }
    }

    fn system_with(
        store: MovieStore,
        mock: Arc<MockLlmClient>,
    ) -> (MovieSystem, Arc<RecordingNotices>) {
        let notices = Arc::new(RecordingNotices::default());
        let gateway = Gateway::new(Some(mock as Arc<dyn LlmClient>), notices.clone());
        (MovieSystem::with_gateway(store, gateway), notices)
    }

    fn ids(movies: &[Movie]) -> Vec<i64> {
        movies.iter().map(Movie::id).collect()
    }

    // --- construction ---

    #[test]
    fn test_blank_key_means_fallback_mode() {
        let (store, _dir) = create_test_store(1);
        assert!(!MovieSystem::new(store.clone(), None).has_api_key());
        assert!(!MovieSystem::new(store.clone(), Some(" \"\" ")).has_api_key());
        assert!(MovieSystem::new(store, Some("sk-test")).has_api_key());
    }

    // --- enrich_movies ---

    #[tokio::test]
    async fn test_enrich_without_key_persists_heuristics() {
        let (store, _dir) = create_test_store(10);
        let system = MovieSystem::new(store, None);

        let count = system.enrich_movies(4).await.unwrap();
        assert_eq!(count, 4);
        assert_eq!(system.store().enrichment_count().unwrap(), 4);

        let movie = &system.store().get_movies(3).unwrap()[2];
        let stored = system.store().get_enrichment(3).unwrap().unwrap();
        assert_eq!(stored, heuristic_enrichment(movie));
        assert_eq!(stored.sentiment, Some(Sentiment::Positive));
    }

    #[tokio::test]
    async fn test_enrich_twice_does_not_duplicate() {
        let (store, _dir) = create_test_store(5);
        let system = MovieSystem::new(store, None);

        system.enrich_movies(5).await.unwrap();
        system.enrich_movies(5).await.unwrap();
        assert_eq!(system.store().enrichment_count().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_enrich_mixes_model_and_fallback() {
        let (store, _dir) = create_test_store(2);
        let mock = Arc::new(MockLlmClient::with_results(vec![
            Ok(r#"{"sentiment": "negative", "budget_tier": "high", "revenue_tier": "high",
                   "effectiveness_score": 90, "target_audience": "Teens"}"#
                .into()),
            Err(unauthorized()),
        ]));
        let (system, notices) = system_with(store, mock);

        assert_eq!(system.enrich_movies(2).await.unwrap(), 2);

        let first = system.store().get_enrichment(1).unwrap().unwrap();
        assert_eq!(first.sentiment, Some(Sentiment::Negative));
        assert_eq!(first.budget_tier, Some(Tier::High));
        assert_eq!(first.target_audience.as_deref(), Some("Teens"));

        let second = system.store().get_enrichment(2).unwrap().unwrap();
        assert_eq!(second.target_audience.as_deref(), Some("Adults"));
        assert!(notices.messages().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_missing_store_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let store = MovieStore::new(crate::store::StoreConfig::new(
            dir.path().join("absent.db"),
            dir.path().join("absent-ratings.db"),
        ));
        let system = MovieSystem::new(store, None);
        assert!(system.enrich_movies(10).await.is_err());
    }

    // --- recommend ---

    #[tokio::test]
    async fn test_recommend_without_key_returns_first_movies() {
        let (store, _dir) = create_test_store(250);
        let system = MovieSystem::new(store, None);

        let movies = system.recommend("anything", 3).await.unwrap();
        assert_eq!(ids(&movies), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fallbacks_survive_row_without_id() {
        let (store, _dir) = create_test_store(5);
        insert_orphan_movie(&store);
        let system = MovieSystem::new(store, None);

        assert_eq!(
            ids(&system.recommend("anything", 3).await.unwrap()),
            vec![1, 2, 3]
        );
        assert_eq!(system.predict_rating(999, "").await.unwrap(), 7.5);
        assert_eq!(system.query("anything").await.unwrap().movies.len(), 5);
        assert_eq!(system.enrich_movies(10).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_recommend_filters_to_model_ids_in_store_order() {
        let (store, _dir) = create_test_store(250);
        let mock = Arc::new(MockLlmClient::new(vec![
            r#"{"recommendations": [150, 7, 220, "12"]}"#.into(),
        ]));
        let (system, _notices) = system_with(store, mock.clone());

        let movies = system.recommend("heists", 3).await.unwrap();
        // 220 is outside the 200-movie fetch.
        assert_eq!(ids(&movies), vec![7, 12, 150]);

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("Query: heists"));
        assert!(prompt.contains("\"title\":\"Movie 50\""));
        assert!(!prompt.contains("\"title\":\"Movie 51\""));
    }

    #[tokio::test]
    async fn test_recommend_truncates_to_limit() {
        let (store, _dir) = create_test_store(20);
        let mock = Arc::new(MockLlmClient::new(vec![
            r#"{"recommendations": [1, 2, 3, 4, 5]}"#.into(),
        ]));
        let (system, _notices) = system_with(store, mock);

        assert_eq!(ids(&system.recommend("q", 2).await.unwrap()), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_recommend_empty_reply_falls_back() {
        let (store, _dir) = create_test_store(20);
        let mock = Arc::new(MockLlmClient::new(vec![r#"{"recommendations": []}"#.into()]));
        let (system, _notices) = system_with(store, mock);

        assert_eq!(
            ids(&system.recommend("q", 4).await.unwrap()),
            vec![1, 2, 3, 4]
        );
    }

    #[tokio::test]
    async fn test_recommend_unauthorized_is_silent() {
        let (store, _dir) = create_test_store(20);
        let mock = Arc::new(MockLlmClient::failing(unauthorized(), 1));
        let (system, notices) = system_with(store, mock);

        assert_eq!(ids(&system.recommend("q", 2).await.unwrap()), vec![1, 2]);
        assert!(notices.messages().is_empty());
    }

    #[tokio::test]
    async fn test_recommend_quota_emits_one_notice() {
        let (store, _dir) = create_test_store(20);
        let mock = Arc::new(MockLlmClient::failing(quota(), 1));
        let (system, notices) = system_with(store, mock);

        assert_eq!(ids(&system.recommend("q", 2).await.unwrap()), vec![1, 2]);
        assert_eq!(notices.messages(), vec![QUOTA_NOTICE.to_string()]);
    }

    // --- predict_rating ---

    #[tokio::test]
    async fn test_predict_unknown_movie_is_default() {
        let (store, _dir) = create_test_store(5);
        let system = MovieSystem::new(store.clone(), None);
        assert_eq!(system.predict_rating(999, "").await.unwrap(), 7.5);

        let mock = Arc::new(MockLlmClient::new(vec![]));
        let (system, _notices) = system_with(store, mock.clone());
        assert_eq!(system.predict_rating(999, "sci-fi").await.unwrap(), 7.5);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_predict_without_key_is_default() {
        let (store, _dir) = create_test_store(5);
        let system = MovieSystem::new(store, None);
        assert_eq!(system.predict_rating(1, "action").await.unwrap(), 7.5);
    }

    #[tokio::test]
    async fn test_predict_uses_model_value_and_rating_count() {
        let (store, _dir) = create_test_store(5);
        let mock = Arc::new(MockLlmClient::new(vec![r#"{"predicted_rating": 8.4}"#.into()]));
        let (system, _notices) = system_with(store, mock.clone());

        let rating = system.predict_rating(1, "").await.unwrap();
        assert_eq!(rating, 8.4);

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("Movie: Movie 1"));
        assert!(prompt.contains("Budget: $1,000,000"));
        assert!(prompt.contains("Ratings: 3"));
        assert!(prompt.contains("Preferences: None"));
    }

    #[tokio::test]
    async fn test_predict_unparseable_is_default() {
        let (store, _dir) = create_test_store(5);
        let mock = Arc::new(MockLlmClient::new(vec![
            r#"{"predicted_rating": "pretty good"}"#.into(),
        ]));
        let (system, _notices) = system_with(store, mock);
        assert_eq!(system.predict_rating(2, "drama").await.unwrap(), 7.5);
    }

    #[tokio::test]
    async fn test_predict_unauthorized_is_silent_default() {
        let (store, _dir) = create_test_store(5);
        let mock = Arc::new(MockLlmClient::failing(unauthorized(), 1));
        let (system, notices) = system_with(store, mock);

        assert_eq!(system.predict_rating(2, "drama").await.unwrap(), 7.5);
        assert!(notices.messages().is_empty());
    }

    // --- query ---

    #[tokio::test]
    async fn test_query_without_key() {
        let (store, _dir) = create_test_store(30);
        let system = MovieSystem::new(store, None);

        let answer = system.query("best heist").await.unwrap();
        assert_eq!(answer.answer, NOT_CONFIGURED_ANSWER);
        assert_eq!(answer.source, AnswerSource::NotConfigured);
        assert_eq!(ids(&answer.movies), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_query_model_answer() {
        let (store, _dir) = create_test_store(30);
        let mock = Arc::new(MockLlmClient::new(vec![
            r#"{"answer": "Try these", "relevant_movies": [4, 9]}"#.into(),
        ]));
        let (system, _notices) = system_with(store, mock);

        let answer = system.query("best heist").await.unwrap();
        assert_eq!(answer.answer, "Try these");
        assert_eq!(answer.source, AnswerSource::Model);
        assert_eq!(ids(&answer.movies), vec![4, 9]);
        assert_eq!(
            answer.columns(),
            vec!["title", "revenue", "budget", "runtime", "genres", "overview"]
        );
    }

    #[tokio::test]
    async fn test_query_unauthorized_is_silent_call_failed() {
        let (store, _dir) = create_test_store(30);
        let mock = Arc::new(MockLlmClient::failing(unauthorized(), 1));
        let (system, notices) = system_with(store, mock);

        let answer = system.query("anything").await.unwrap();
        assert_eq!(answer.answer, CALL_FAILED_ANSWER);
        assert_eq!(answer.source, AnswerSource::CallFailed);
        assert_eq!(answer.movies.len(), 5);
        assert!(notices.messages().is_empty());
    }

    #[tokio::test]
    async fn test_query_quota_emits_one_notice() {
        let (store, _dir) = create_test_store(30);
        let mock = Arc::new(MockLlmClient::failing(quota(), 1));
        let (system, notices) = system_with(store, mock);

        let answer = system.query("anything").await.unwrap();
        assert_eq!(answer.answer, CALL_FAILED_ANSWER);
        assert_eq!(notices.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_query_other_error_notice_is_truncated() {
        let (store, _dir) = create_test_store(30);
        let long = format!("connection reset by peer {}", "!".repeat(200));
        let mock = Arc::new(MockLlmClient::failing(LlmError::Http(long), 1));
        let (system, notices) = system_with(store, mock);

        system.query("anything").await.unwrap();
        let messages = notices.messages();
        assert_eq!(messages.len(), 1);
        let detail = messages[0].strip_prefix("LLM error: ").unwrap();
        assert_eq!(detail.chars().count(), 80);
        assert!(detail.starts_with("HTTP error: connection reset"));
    }

    #[tokio::test]
    async fn test_query_empty_object_counts_as_failure() {
        let (store, _dir) = create_test_store(30);
        let mock = Arc::new(MockLlmClient::new(vec!["{}".into()]));
        let (system, _notices) = system_with(store, mock);

        let answer = system.query("anything").await.unwrap();
        assert_eq!(answer.source, AnswerSource::CallFailed);
    }

    #[tokio::test]
    async fn test_query_options_narrow_candidates() {
        let (store, _dir) = create_test_store(30);
        let mock = Arc::new(MockLlmClient::new(vec![
            r#"{"answer": "Action picks", "relevant_movies": [3, 4, 20, 22]}"#.into(),
        ]));
        let (system, _notices) = system_with(store, mock.clone());

        let options = QueryOptions {
            genre: Some("action".into()),
            min_revenue: Some(100_000_000.0),
        };
        let answer = system.query_with_options("big action", &options).await.unwrap();
        // Odd ids are Drama; revenue of movie 4 is only 20M.
        assert_eq!(ids(&answer.movies), vec![20, 22]);

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("\"title\":\"Movie 20\""));
        assert!(!prompt.contains("\"title\":\"Movie 3\""));
    }

    #[test]
    fn test_columns_skip_all_null() {
        let movie = crate::store::test_movie(serde_json::json!({
            "movieid": 1, "title": "Only title", "revenue": null
        }));
        let answer = QueryAnswer {
            answer: String::new(),
            movies: vec![movie],
            source: AnswerSource::Model,
        };
        assert_eq!(answer.columns(), vec!["title"]);
    }

    // --- compare_movies ---

    #[tokio::test]
    async fn test_compare_without_key() {
        let (store, _dir) = create_test_store(10);
        let system = MovieSystem::new(store, None);

        let comparison = system
            .compare_movies(&[3, 1, 42], DEFAULT_COMPARISON_CRITERIA)
            .await
            .unwrap();
        assert_eq!(comparison.comparison, NOT_CONFIGURED_COMPARISON);
        assert_eq!(comparison.summary, NOT_CONFIGURED_SUMMARY);
        assert_eq!(ids(&comparison.movies), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_compare_model_reply() {
        let (store, _dir) = create_test_store(10);
        let mock = Arc::new(MockLlmClient::new(vec![
            r#"{"comparison": "Movie 2 earned more", "summary": "Movie 2 wins"}"#.into(),
        ]));
        let (system, _notices) = system_with(store, mock.clone());

        let comparison = system.compare_movies(&[1, 2], "revenue").await.unwrap();
        assert_eq!(comparison.comparison, "Movie 2 earned more");
        assert_eq!(comparison.summary, "Movie 2 wins");
        assert_eq!(comparison.source, AnswerSource::Model);
        assert_eq!(ids(&comparison.movies), vec![1, 2]);
        assert!(mock.last_prompt().unwrap().starts_with("Compare these movies on: revenue"));
    }

    #[tokio::test]
    async fn test_compare_missing_summary_defaults() {
        let (store, _dir) = create_test_store(10);
        let mock = Arc::new(MockLlmClient::new(vec![r#"{"comparison": "close"}"#.into()]));
        let (system, _notices) = system_with(store, mock);

        let comparison = system.compare_movies(&[1, 2], "revenue").await.unwrap();
        assert_eq!(comparison.summary, NO_SUMMARY);
    }

    #[tokio::test]
    async fn test_compare_failure() {
        let (store, _dir) = create_test_store(10);
        let mock = Arc::new(MockLlmClient::failing(unauthorized(), 1));
        let (system, notices) = system_with(store, mock);

        let comparison = system.compare_movies(&[1, 2], "revenue").await.unwrap();
        assert_eq!(comparison.comparison, CALL_FAILED_COMPARISON);
        assert_eq!(comparison.summary, CALL_FAILED_SUMMARY);
        assert_eq!(comparison.source, AnswerSource::CallFailed);
        assert_eq!(comparison.movies.len(), 2);
        assert!(notices.messages().is_empty());
    }
}
