//! Cache warming with common phrases
//!
//! Phrase lists come from JSON files (`[{"user_input", "response", "topic"}]`)
//! and audio from a caller-supplied synthesis closure. Synthesis is awaited
//! outside the cache lock; a failed phrase is logged and skipped.

use crate::cache::store::ResponseCache;
use crate::cache::types::CacheTier;
use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use tracing::{info, warn};

/// Common phrase pre-loaded into tier1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmPhrase {
    pub user_input: String,
    pub response: String,
    #[serde(default)]
    pub topic: Option<String>,
}

impl WarmPhrase {
    pub fn new(user_input: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            response: response.into(),
            topic: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// Parse a JSON array of warm phrases
pub fn parse_warm_phrases(json: &str) -> Result<Vec<WarmPhrase>> {
    Ok(serde_json::from_str(json)?)
}

/// Read a JSON phrase list from disk
pub fn load_warm_phrases(path: impl AsRef<Path>) -> Result<Vec<WarmPhrase>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_warm_phrases(&content)
}

impl ResponseCache {
    /// Pre-populate tier1 with phrases and their synthesized audio.
    ///
    /// Returns how many phrases were written.
    pub async fn warm_cache<F, Fut>(&self, phrases: &[WarmPhrase], synthesize: F, stage: &str) -> usize
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = anyhow::Result<Bytes>>,
    {
        let mut warmed = 0;

        for phrase in phrases {
            let audio = match synthesize(phrase.response.clone()).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("Failed to warm cache for '{}': {:#}", phrase.user_input, e);
                    continue;
                }
            };

            self.cache_response(
                stage,
                &phrase.user_input,
                &phrase.response,
                Some(audio),
                phrase.topic.as_deref(),
                CacheTier::Tier1,
            )
            .await;
            warmed += 1;
        }

        info!("Cache warmed with {} of {} phrases", warmed, phrases.len());
        warmed
    }
}
