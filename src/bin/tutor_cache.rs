use anyhow::Result;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutor_cache::cache::load_warm_phrases;
use tutor_cache::{start_auto_cleanup, CacheConfig, CacheTier, ResponseCache, TemplateEngine};

const STAGES: &[&str] = &["greeting", "vocabulary_learning", "topic_discussion", "closing"];

const UTTERANCES: &[&str] = &[
    "Hello there",
    "I like apples",
    "I like apples very much",
    "Can we talk about food?",
    "What does delicious mean?",
    "I went to the market yesterday",
    "How do I say this word?",
    "Thank you, goodbye",
];

const TOPICS: &[&str] = &["food", "travel", "family"];

#[derive(Parser)]
#[command(name = "tutor-cache")]
#[command(about = "Multi-level response cache for voice tutoring", long_about = None)]
struct Cli {
    /// Optional JSON template set replacing the built-in templates
    #[arg(long)]
    templates: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the tier3 template for a turn
    Template {
        /// Conversation stage
        #[arg(short, long)]
        stage: String,

        /// Learner name
        #[arg(short, long)]
        user_name: String,

        /// Optional topic
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Run concurrent synthetic sessions and print cache stats
    Simulate {
        /// Number of concurrent sessions
        #[arg(long, default_value = "8")]
        sessions: usize,

        /// Turns per session
        #[arg(long, default_value = "20")]
        turns: usize,

        /// Write generated responses to one tier only (tier1|tier2)
        /// instead of recording them into both
        #[arg(long)]
        level: Option<CacheTier>,
    },

    /// Warm the cache from a JSON phrase list and print cache stats
    Warm {
        /// Path to `[{"user_input", "response", "topic"}]`
        #[arg(short, long)]
        phrases: PathBuf,

        /// Stage the phrases belong to
        #[arg(short, long, default_value = "greeting")]
        stage: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tutor_cache=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = CacheConfig::from_env()?;

    let templates = match &cli.templates {
        Some(path) => TemplateEngine::from_json_str(&std::fs::read_to_string(path)?)?,
        None => TemplateEngine::default(),
    };
    let cache = Arc::new(ResponseCache::try_new(config)?.with_templates(templates));
    let cleanup = start_auto_cleanup(Arc::clone(&cache));

    match cli.command {
        Commands::Template {
            stage,
            user_name,
            topic,
        } => match cache.template_fallback(&stage, &user_name, topic.as_deref()) {
            Some(response) => println!("{}", response.text),
            None => println!("No template for stage {}", stage),
        },
        Commands::Simulate {
            sessions,
            turns,
            level,
        } => {
            simulate(&cache, sessions, turns, level).await?;
            println!("{}", serde_json::to_string_pretty(&cache.stats().await)?);
        }
        Commands::Warm { phrases, stage } => {
            let phrases = load_warm_phrases(&phrases)?;
            let warmed = cache
                .warm_cache(
                    &phrases,
                    |text| async move { Ok(Bytes::from(text.into_bytes())) },
                    &stage,
                )
                .await;
            info!("Warmed {} phrases", warmed);
            println!("{}", serde_json::to_string_pretty(&cache.stats().await)?);
        }
    }

    if let Some(handle) = cleanup {
        handle.abort();
    }
    Ok(())
}

/// Each session looks up, falls back to a template on a miss, then stores
/// the "generated" response and backfills placeholder audio.
async fn simulate(
    cache: &Arc<ResponseCache>,
    sessions: usize,
    turns: usize,
    level: Option<CacheTier>,
) -> Result<()> {
    if level == Some(CacheTier::Tier3) {
        anyhow::bail!("tier3 holds static templates and cannot be written");
    }

    let mut handles = Vec::with_capacity(sessions);

    for session in 0..sessions {
        let cache = Arc::clone(cache);
        handles.push(tokio::spawn(async move {
            let user_name = format!("learner{}", session);
            for _ in 0..turns {
                let (stage, input, topic) = {
                    let mut rng = rand::thread_rng();
                    (
                        *STAGES.choose(&mut rng).unwrap_or(&"greeting"),
                        *UTTERANCES.choose(&mut rng).unwrap_or(&"Hello there"),
                        TOPICS.choose(&mut rng).copied(),
                    )
                };

                let prediction = cache.fast_lookup(stage, input, topic).await;
                let prediction =
                    prediction.or_else(|| cache.template_fallback(stage, &user_name, topic));

                let generated = format!("[{}] reply to: {}", stage, input.to_lowercase());
                match level {
                    Some(level) => {
                        cache
                            .cache_response(stage, input, &generated, None, topic, level)
                            .await
                    }
                    None => {
                        cache
                            .record(prediction.as_ref(), &generated, input, stage, topic)
                            .await;
                    }
                }
                cache
                    .backfill_audio(stage, input, Bytes::from(generated.into_bytes()), topic)
                    .await;
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_level_parses_tier_names() {
        let cli = Cli::try_parse_from(["tutor-cache", "simulate", "--level", "L2"]).unwrap();
        match cli.command {
            Commands::Simulate { level, .. } => assert_eq!(level, Some(CacheTier::Tier2)),
            _ => panic!("expected simulate"),
        }

        assert!(Cli::try_parse_from(["tutor-cache", "simulate", "--level", "tier9"]).is_err());
    }

    #[tokio::test]
    async fn test_simulate_single_level_fills_only_that_tier() {
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
        simulate(&cache, 2, 5, Some(CacheTier::Tier2)).await.unwrap();
        assert_eq!(cache.len(CacheTier::Tier1).await, 0);
        assert!(cache.len(CacheTier::Tier2).await > 0);

        assert!(simulate(&cache, 1, 1, Some(CacheTier::Tier3)).await.is_err());
    }
}
