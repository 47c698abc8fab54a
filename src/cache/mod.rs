//! # Multi-Level Response Cache
//!
//! Caches tutor responses and their synthesized audio so repeated or similar
//! learner utterances can be answered without waiting on generation.
//!
//! ## Tiers
//!
//! - Tier 1: exact match on the normalized utterance (confidence 0.95)
//! - Tier 2: MD5 fingerprint of stage, topic and a normalized prefix (0.85)
//! - Tier 3: static stage templates, outside the fast path (0.55)
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: checked on every read, purged on an amortized sweep
//! - **Capacity Eviction**: least-hit, soonest-expiring entries go first
//! - **Two-Phase Writes**: text now, audio backfilled when synthesis finishes
//! - **Learning**: final responses are recorded and predictions scored
//! - **Telemetry**: lock-free counters and rolling latency windows
//!
//! ## Example
//!
//! ```rust
//! use tutor_cache::cache::{CacheConfig, CacheTier, ResponseCache};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = CacheConfig::builder()
//!     .ttl(Duration::from_secs(3600))
//!     .tier1_max_entries(500)
//!     .build();
//!
//! let cache = ResponseCache::new(config);
//!
//! cache
//!     .cache_response("greeting", "Hello there", "Hi! Ready to practice?", None, None, CacheTier::Tier1)
//!     .await;
//!
//! if let Some(hit) = cache.fast_lookup("greeting", "hello THERE", None).await {
//!     println!("Cache hit from {}: {}", hit.source, hit.text);
//! }
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod entry;
pub mod integration;
pub mod invalidation;
pub mod key;
pub mod learning;
pub mod normalize;
pub mod store;
pub mod template;
pub mod tier;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::TierEntry;
pub use integration::{load_warm_phrases, parse_warm_phrases, WarmPhrase};
pub use invalidation::{InvalidationEvent, InvalidationReason, SweepPolicy};
pub use key::PatternKeyDeriver;
pub use learning::{is_prediction_match, prediction_similarity, RecordOutcome};
pub use normalize::normalize;
pub use store::{start_auto_cleanup, ResponseCache};
pub use template::TemplateEngine;
pub use tier::TierTable;
pub use types::{AudioRequirement, CacheStats, CacheTier, CachedResponse};
