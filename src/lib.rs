//! # tutor-cache
//!
//! Multi-level, TTL-based response and audio cache for a real-time voice
//! tutoring pipeline.
//!
//! ## Features
//!
//! - Exact, pattern and template tiers with fixed confidences
//! - Async-first design using tokio; one lock for both tiers
//! - Hit-count based eviction and amortized expiry sweeps
//! - Audio backfill after asynchronous speech synthesis
//! - Prediction learning and JSON-serializable telemetry
//!
//! ## Fast Path
//!
//! ```no_run
//! use tutor_cache::{CacheConfig, ResponseCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = ResponseCache::try_new(CacheConfig::from_env()?)?;
//!
//!     let hit = cache
//!         .fast_lookup("vocabulary_learning", "I like apples", Some("food"))
//!         .await;
//!     let response = match hit {
//!         Some(hit) => hit,
//!         None => match cache.template_fallback("vocabulary_learning", "Amina", Some("food")) {
//!             Some(fallback) => fallback,
//!             None => return Ok(()),
//!         },
//!     };
//!     println!("{} ({:.2})", response.text, response.confidence());
//!     Ok(())
//! }
//! ```
//!
//! ## Recording Results
//!
//! ```no_run
//! use bytes::Bytes;
//! use tutor_cache::{CacheConfig, ResponseCache};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = ResponseCache::new(CacheConfig::default());
//!
//!     let outcome = cache
//!         .record(None, "Apples are a healthy snack!", "I like apples", "vocabulary_learning", Some("food"))
//!         .await;
//!     println!("prediction matched: {}", outcome.matched);
//!
//!     // later, once synthesis finishes
//!     cache
//!         .backfill_audio("vocabulary_learning", "I like apples", Bytes::from_static(b"..."), Some("food"))
//!         .await;
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    start_auto_cleanup, AudioRequirement, CacheConfig, CacheConfigBuilder, CacheStats, CacheTier,
    CachedResponse, Clock, InvalidationEvent, InvalidationReason, ManualClock,
    PatternKeyDeriver, RecordOutcome, ResponseCache, SweepPolicy, SystemClock, TemplateEngine,
    WarmPhrase,
};
pub use error::{CacheError, Result};
