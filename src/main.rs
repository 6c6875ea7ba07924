use movie_insight::gateway::{KeyCheck, check_api_key};
use movie_insight::llm::OpenAiClient;
use movie_insight::store::{MovieStore, StoreConfig};
use movie_insight::system::{DEFAULT_COMPARISON_CRITERIA, MovieSystem};
use movie_insight::{API_KEY_ENV, format_dollars, key_preview, resolve_api_key};

const DEMO_QUERY: &str = "action movies with high revenue and positive sentiment";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let api_key = resolve_api_key();
    match api_key.as_deref() {
        Some(key) => announce_key(key).await,
        None => {
            println!("Warning: {API_KEY_ENV} not set. Using fallback mode.");
            println!("To set: export {API_KEY_ENV}=your_key");
        }
    }

    let store = MovieStore::new(StoreConfig::from_env());
    let system = MovieSystem::new(store, api_key.as_deref());

    println!("Enriching movies...");
    let count = system.enrich_movies(100).await?;
    println!("Enriched {count} movies");

    println!("\n=== Recommendations ===");
    for movie in system.recommend(DEMO_QUERY, 5).await? {
        println!("- {} ({})", movie.title(), format_dollars(movie.revenue()));
    }

    println!("\n=== Rating Prediction ===");
    let rating = system.predict_rating(1, "prefers action and sci-fi").await?;
    println!("Predicted rating: {rating:.1}/10");

    println!("\n=== Natural Language Query ===");
    let answer = system.query(&format!("Recommend {DEMO_QUERY}")).await?;
    println!("Answer: {}", answer.answer);

    println!("\n=== Comparison ===");
    let comparison = system
        .compare_movies(&[1, 2, 3], DEFAULT_COMPARISON_CRITERIA)
        .await?;
    println!("{}", comparison.summary);

    Ok(())
}

/// Print the key banner and validate the key once. Never fatal.
async fn announce_key(key: &str) {
    let client = OpenAiClient::configured(key.to_string());
    println!(
        "OpenAI API key detected ({}, length {}). Using LLM features with {}.",
        key_preview(key),
        key.chars().count(),
        client.model()
    );
    if !key.starts_with("sk-") {
        println!("Warning: API key does not start with \"sk-\". Check that it was copied correctly.");
    }

    match check_api_key(&client).await {
        KeyCheck::Valid => println!("API key validated successfully."),
        KeyCheck::Invalid => {
            println!("Warning: API key appears invalid. Please check your OpenAI API key.");
            println!("Get a valid key at: https://platform.openai.com/api-keys");
        }
        KeyCheck::Unverified(detail) => println!("API key validation: {detail}"),
    }
}
