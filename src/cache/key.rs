//! Cache key derivation for the exact and pattern tiers

use crate::cache::normalize::{normalize, truncate_chars};

/// Default number of normalized characters that feed a pattern fingerprint
pub const DEFAULT_PATTERN_PREFIX_LEN: usize = 100;

/// Topic bucket used when a turn carries no topic
pub const DEFAULT_TOPIC_BUCKET: &str = "general";

/// Derives Tier1 and Tier2 keys from a conversation turn.
///
/// Tier1 keys are the normalized utterance itself. Tier2 keys are a
/// fixed-width MD5 fingerprint of `stage:topic:prefix`, where `prefix` is the
/// first `prefix_len` characters of the normalized utterance. Paraphrases that
/// share that prefix land in the same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternKeyDeriver {
    prefix_len: usize,
}

impl Default for PatternKeyDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_PREFIX_LEN)
    }
}

impl PatternKeyDeriver {
    /// Create a deriver with a custom prefix length
    pub fn new(prefix_len: usize) -> Self {
        Self { prefix_len }
    }

    /// Prefix length in characters
    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Tier1 key: the full normalized utterance
    pub fn exact_key(&self, user_input: &str) -> String {
        normalize(user_input)
    }

    /// Truncated normalized text kept on Tier2 entries for diagnostics
    pub fn snippet(&self, user_input: &str) -> String {
        let normalized = normalize(user_input);
        truncate_chars(&normalized, self.prefix_len).to_string()
    }

    /// Tier2 key: 32-char lowercase hex MD5 of `stage:topic:prefix`
    pub fn derive(&self, stage: &str, user_input: &str, topic: Option<&str>) -> String {
        let snippet = self.snippet(user_input);
        self.derive_from_snippet(stage, &snippet, topic)
    }

    /// Same as [`derive`](Self::derive) for callers that already hold the snippet
    pub fn derive_from_snippet(&self, stage: &str, snippet: &str, topic: Option<&str>) -> String {
        let topic_bucket = normalize(topic.unwrap_or(DEFAULT_TOPIC_BUCKET));
        let combined = format!("{}:{}:{}", stage, topic_bucket, snippet);
        format!("{:x}", md5::compute(combined.as_bytes()))
    }
}
