//! Core type definitions for the response cache

use crate::error::CacheError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cache tier a response came from (or is written to)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Tier 1: exact normalized utterance
    Tier1,

    /// Tier 2: stage/topic/prefix fingerprint
    Tier2,

    /// Tier 3: stage template
    Tier3,
}

impl CacheTier {
    /// Fixed confidence of a response served from this tier
    pub fn confidence(&self) -> f64 {
        match self {
            CacheTier::Tier1 => 0.95,
            CacheTier::Tier2 => 0.85,
            CacheTier::Tier3 => 0.55,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Tier1 => "tier1",
            CacheTier::Tier2 => "tier2",
            CacheTier::Tier3 => "tier3",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheTier {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tier1" | "l1" | "exact" => Ok(CacheTier::Tier1),
            "tier2" | "l2" | "pattern" => Ok(CacheTier::Tier2),
            "tier3" | "l3" | "template" => Ok(CacheTier::Tier3),
            other => Err(CacheError::InvalidTier(other.to_string())),
        }
    }
}

/// Whether a lookup may return an entry whose audio is not ready yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioRequirement {
    #[default]
    Optional,
    /// Entries without audio are treated as misses
    Required,
}

/// Tier-agnostic lookup result
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub text: String,
    pub audio: Option<Bytes>,
    pub stage: String,
    pub source: CacheTier,
    pub cache_timestamp: DateTime<Utc>,
    pub hit_count: u64,
    pub topic: Option<String>,
}

impl CachedResponse {
    /// Derived from `source`, never stored
    pub fn confidence(&self) -> f64 {
        self.source.confidence()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// Per-tier counters for tier1 and tier2
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub entries: usize,
    pub avg_latency_ms: f64,
}

/// Template tier counters; it has no entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateStats {
    pub hits: u64,
    pub avg_latency_ms: f64,
}

/// Fast-path request totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_requests: u64,
    /// Tier1 + tier2 hits; template fallbacks are reported under `tier3`
    pub total_hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
}

/// Learning recorder counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub recorded: u64,
    pub prediction_matches: u64,
}

/// Entries removed by the sweep and by capacity eviction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvictionStats {
    pub expired: u64,
    pub capacity: u64,
}

/// Snapshot returned by `ResponseCache::stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub tier1: TierStats,
    pub tier2: TierStats,
    pub tier3: TemplateStats,
    pub overall: OverallStats,
    pub learning: LearningStats,
    pub evictions: EvictionStats,
}

impl CacheStats {
    /// Percentage of fast-path requests answered by tier1 or tier2
    pub fn hit_rate(&self) -> f64 {
        if self.overall.total_requests == 0 {
            0.0
        } else {
            self.overall.total_hits as f64 / self.overall.total_requests as f64 * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ requests: {}, hits: {} (t1 {}, t2 {}), t3: {}, misses: {}, hit_rate: {:.2}%, entries: {}/{} }}",
            self.overall.total_requests,
            self.overall.total_hits,
            self.tier1.hits,
            self.tier2.hits,
            self.tier3.hits,
            self.overall.misses,
            self.overall.hit_rate_percent,
            self.tier1.entries,
            self.tier2.entries,
        )
    }
}
