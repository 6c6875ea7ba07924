use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use movie_insight::enrichment::Enrichment;
use movie_insight::gateway::{KeyCheck, check_api_key};
use movie_insight::llm::OpenAiClient;
use movie_insight::store::{Movie, MovieStore, StoreConfig};
use movie_insight::system::{DEFAULT_COMPARISON_CRITERIA, MovieSystem, QueryAnswer, QueryOptions};
use movie_insight::{format_dollars, key_preview, resolve_api_key};

#[derive(Parser)]
#[command(
    name = "movie-insight-cli",
    about = "Movie Insight — enrich the catalog and ask questions about it"
)]
struct Cli {
    /// Output machine-readable JSON (default: human-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Movies database (overrides MOVIE_INSIGHT_MOVIES_DB)
    #[arg(long, global = true)]
    movies_db: Option<PathBuf>,

    /// Ratings database (overrides MOVIE_INSIGHT_RATINGS_DB)
    #[arg(long, global = true)]
    ratings_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive and store enrichment for the first movies
    Enrich {
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Recommend movies for a free-text request
    Recommend {
        /// Request text (positional, collects remaining args)
        #[arg(required = true)]
        query: Vec<String>,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Predict a 0-10 rating for one movie
    Predict {
        movie_id: i64,
        #[arg(long, default_value = "")]
        preferences: String,
    },
    /// Ask a question about the catalog
    Query {
        /// Question text (positional, collects remaining args)
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(long, help = "Only consider movies whose genres contain this")]
        genre: Option<String>,
        #[arg(long, help = "Only consider movies with at least this revenue")]
        min_revenue: Option<f64>,
    },
    /// Compare several movies
    Compare {
        #[arg(required = true)]
        movie_ids: Vec<i64>,
        #[arg(long, default_value = DEFAULT_COMPARISON_CRITERIA)]
        criteria: String,
    },
    /// Show the stored enrichment of a movie
    Show { movie_id: i64 },
    /// Check whether the configured API key is accepted
    CheckKey,
}

// ============================================================================
// Output Formatting
// ============================================================================

/// Title and revenue on one line.
fn format_movie(movie: &Movie) {
    println!(
        "- {} [{}] ({})",
        movie.title(),
        movie.id(),
        format_dollars(movie.revenue())
    );
}

/// One row per movie with the answer's non-empty columns.
fn format_answer_table(answer: &QueryAnswer) {
    let columns = answer.columns();
    if columns.is_empty() {
        return;
    }
    let header: Vec<String> = columns.iter().map(|c| capitalize_first(c)).collect();
    println!("{}", header.join(" | "));
    for movie in &answer.movies {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| display_value(movie.get(column)))
            .collect();
        println!("{}", cells.join(" | "));
    }
}

fn format_enrichment(movie_id: i64, enrichment: &Enrichment) {
    println!("Movie {movie_id}");
    let rows = [
        ("Sentiment", enrichment.sentiment.map(|s| s.to_string())),
        ("Budget tier", enrichment.budget_tier.map(|t| t.to_string())),
        ("Revenue tier", enrichment.revenue_tier.map(|t| t.to_string())),
        (
            "Effectiveness",
            enrichment.effectiveness_score.map(|s| format!("{s:.1}")),
        ),
        ("Target audience", enrichment.target_audience.clone()),
        ("Content rating", enrichment.content_rating.clone()),
    ];
    for (name, value) in rows {
        if let Some(value) = value {
            println!("  {name}: {value}");
        }
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Capitalize the first letter of a string.
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(path) = cli.movies_db {
        config.movies_db = path;
    }
    if let Some(path) = cli.ratings_db {
        config.ratings_db = path;
    }

    let api_key = resolve_api_key();
    let system = MovieSystem::new(MovieStore::new(config), api_key.as_deref());

    match cli.command {
        Command::Enrich { limit } => {
            let count = system.enrich_movies(limit).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "enriched": count }));
            } else {
                println!("Enriched {count} movies");
            }
        }
        Command::Recommend { query, limit } => {
            let movies = system.recommend(&query.join(" "), limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&movies)?);
            } else if movies.is_empty() {
                eprintln!("No recommendations.");
            } else {
                for movie in &movies {
                    format_movie(movie);
                }
            }
        }
        Command::Predict {
            movie_id,
            preferences,
        } => {
            let rating = system.predict_rating(movie_id, &preferences).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "movie_id": movie_id, "predicted_rating": rating })
                );
            } else {
                println!("Predicted rating: {rating:.1}/10");
            }
        }
        Command::Query {
            text,
            genre,
            min_revenue,
        } => {
            let options = QueryOptions { genre, min_revenue };
            let answer = system.query_with_options(&text.join(" "), &options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("Answer: {}", answer.answer);
                if !answer.movies.is_empty() {
                    println!();
                    format_answer_table(&answer);
                }
            }
        }
        Command::Compare {
            movie_ids,
            criteria,
        } => {
            let comparison = system.compare_movies(&movie_ids, &criteria).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                println!("{}", comparison.comparison);
                println!();
                println!("Summary: {}", comparison.summary);
                for movie in &comparison.movies {
                    format_movie(movie);
                }
            }
        }
        Command::Show { movie_id } => match system.store().get_enrichment(movie_id)? {
            Some(enrichment) => {
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&enrichment)?);
                } else {
                    format_enrichment(movie_id, &enrichment);
                }
            }
            None => eprintln!("No enrichment stored for movie {movie_id}"),
        },
        Command::CheckKey => {
            let client = OpenAiClient::from_env()?;
            let key = key_preview(api_key.as_deref().unwrap_or_default());
            let check = check_api_key(&client).await;
            if cli.json {
                let (status, detail) = match &check {
                    KeyCheck::Valid => ("valid", None),
                    KeyCheck::Invalid => ("invalid", None),
                    KeyCheck::Unverified(detail) => ("unverified", Some(detail.as_str())),
                };
                println!(
                    "{}",
                    serde_json::json!({
                        "key": key,
                        "model": client.model(),
                        "status": status,
                        "detail": detail,
                    })
                );
            } else {
                match check {
                    KeyCheck::Valid => println!("{key}: valid ({})", client.model()),
                    KeyCheck::Invalid => println!("{key}: rejected by provider"),
                    KeyCheck::Unverified(detail) => println!("{key}: could not verify ({detail})"),
                }
            }
        }
    }

    Ok(())
}
