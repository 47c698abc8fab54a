//! Records final responses back into the cache and scores predictions

use crate::cache::normalize::normalize;
use crate::cache::store::ResponseCache;
use crate::cache::types::{CacheTier, CachedResponse};
use serde::Serialize;
use std::sync::atomic::Ordering;
use strsim::normalized_levenshtein;
use tracing::debug;

/// Result of recording one finished turn
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordOutcome {
    /// The prediction was close enough to the actual response
    pub matched: bool,

    /// Similarity of prediction and actual text, `None` without a prediction
    pub similarity: Option<f64>,

    /// Tier the prediction came from
    pub predicted_from: Option<CacheTier>,
}

/// Normalized Levenshtein similarity of two responses, in `[0, 1]`
pub fn prediction_similarity(predicted: &str, actual: &str) -> f64 {
    let predicted = normalize(predicted);
    let actual = normalize(actual);
    if predicted.is_empty() || actual.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&predicted, &actual)
}

/// Whether a predicted response counts as a match for the actual one
pub fn is_prediction_match(predicted: &str, actual: &str, threshold: f64) -> bool {
    prediction_similarity(predicted, actual) >= threshold
}

impl ResponseCache {
    /// Store the response actually delivered for a turn.
    ///
    /// Writes `actual_text` into both the tier1 and tier2 slot for the input,
    /// under one lock acquisition. Audio already cached for identical text is
    /// kept; use `backfill_audio` once synthesis finishes.
    pub async fn record(
        &self,
        prediction: Option<&CachedResponse>,
        actual_text: &str,
        user_input: &str,
        stage: &str,
        topic: Option<&str>,
    ) -> RecordOutcome {
        let similarity = prediction.map(|p| prediction_similarity(&p.text, actual_text));
        let matched = similarity
            .map(|s| s >= self.config.prediction_match_threshold)
            .unwrap_or(false);

        let exact_key = self.keys.exact_key(user_input);
        let snippet = self.keys.snippet(user_input);
        let pattern_key = self.keys.derive_from_snippet(stage, &snippet, topic);
        let now = self.clock.now();

        if exact_key.is_empty() {
            debug!("Skipping {} record writes: input normalizes to nothing", stage);
        } else {
            let mut store = self.store.write().await;
            self.write_locked(
                &mut store,
                CacheTier::Tier1,
                exact_key,
                actual_text,
                None,
                now,
                None,
            );
            self.write_locked(
                &mut store,
                CacheTier::Tier2,
                pattern_key,
                actual_text,
                None,
                now,
                Some(snippet),
            );
        }

        self.counters.recorded.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.counters
                .prediction_matches
                .fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            "Recorded {} response (prediction matched: {})",
            stage, matched
        );

        RecordOutcome {
            matched,
            similarity,
            predicted_from: prediction.map(|p| p.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use bytes::Bytes;

    #[test]
    fn test_similarity_ignores_case_and_spacing() {
        assert_eq!(prediction_similarity("Great job!", "  great   JOB "), 1.0);
        assert_eq!(prediction_similarity("", "anything"), 0.0);
    }

    #[test]
    fn test_match_threshold() {
        assert!(is_prediction_match(
            "Let's practice the word apple.",
            "Let's practice the word apples.",
            0.82
        ));
        assert!(!is_prediction_match(
            "Let's practice the word apple.",
            "Tell me about your weekend.",
            0.82
        ));
    }

    #[tokio::test]
    async fn test_record_writes_both_tiers() {
        let cache = ResponseCache::new(CacheConfig::default());
        let outcome = cache
            .record(None, "Apples are fruit.", "I like apples", "vocabulary_learning", Some("food"))
            .await;
        assert!(!outcome.matched);
        assert_eq!(outcome.similarity, None);

        assert_eq!(cache.len(CacheTier::Tier1).await, 1);
        assert_eq!(cache.len(CacheTier::Tier2).await, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.learning.recorded, 1);
        assert_eq!(stats.learning.prediction_matches, 0);
    }

    #[tokio::test]
    async fn test_record_counts_matching_prediction() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache
            .cache_response("greeting", "hi", "Hello Amina!", None, None, CacheTier::Tier1)
            .await;
        let prediction = cache.fast_lookup("greeting", "hi", None).await.unwrap();

        let outcome = cache
            .record(Some(&prediction), "Hello, Amina!", "hi", "greeting", None)
            .await;
        assert!(outcome.matched);
        assert_eq!(outcome.predicted_from, Some(CacheTier::Tier1));
        assert_eq!(cache.stats().await.learning.prediction_matches, 1);
    }

    #[tokio::test]
    async fn test_record_keeps_audio_for_same_text() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache
            .cache_response("greeting", "hi", "Hello!", None, None, CacheTier::Tier1)
            .await;
        cache
            .backfill_audio("greeting", "hi", Bytes::from_static(b"mp3"), None)
            .await;

        cache.record(None, "Hello!", "hi", "greeting", None).await;
        let hit = cache.fast_lookup("greeting", "hi", None).await.unwrap();
        assert!(hit.has_audio());
    }
}
