//! Expiry sweeps and capacity eviction
//!
//! Expired entries are already invisible to lookups, so the physical purge is
//! amortized: it runs once every `every_ops` tier operations, and only on
//! tiers whose occupancy is above the high-water mark.

use crate::cache::entry::TierEntry;
use crate::cache::types::CacheTier;
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Reason an entry left a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Entry expired based on TTL
    Expired,

    /// Removed by an explicit clear
    Manual,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::Manual => write!(f, "manual invalidation"),
        }
    }
}

/// Record of a batch of keys removed from one tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub tier: CacheTier,
    pub reason: InvalidationReason,
    pub timestamp: DateTime<Utc>,
    pub keys: Vec<String>,
}

impl InvalidationEvent {
    pub fn new(
        tier: CacheTier,
        reason: InvalidationReason,
        keys: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tier,
            reason,
            timestamp,
            keys,
        }
    }
}

/// Cadence of the amortized expiry sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPolicy {
    /// Sweep once every this many tier operations (lookups and writes)
    pub every_ops: u64,

    /// Only sweep a tier whose `len > high_water_ratio * max_entries`
    pub high_water_ratio: f64,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            every_ops: 100,
            high_water_ratio: 0.8,
        }
    }
}

impl SweepPolicy {
    pub fn new(every_ops: u64, high_water_ratio: f64) -> Self {
        Self {
            every_ops,
            high_water_ratio,
        }
    }

    /// Sweep on every operation regardless of occupancy
    pub fn eager() -> Self {
        Self::new(1, 0.0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.every_ops == 0 {
            return Err(CacheError::ConfigError(
                "sweep every_ops must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.high_water_ratio) {
            return Err(CacheError::ConfigError(
                "sweep high_water_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether operation number `op` (1-based) falls on a sweep tick
    pub fn is_due(&self, op: u64) -> bool {
        self.every_ops > 0 && op % self.every_ops == 0
    }

    /// Whether a tier at `len` of `max_entries` is above the high-water mark
    pub fn above_high_water(&self, len: usize, max_entries: usize) -> bool {
        len as f64 > max_entries as f64 * self.high_water_ratio
    }
}

/// Number of entries evicted when a tier hits capacity: `ceil(max / 10)`, at least 1
pub fn eviction_batch(max_entries: usize) -> usize {
    max_entries.div_ceil(10).max(1)
}

/// Eviction priority: least-used first, then soonest-to-expire
pub fn eviction_order(a: &TierEntry, b: &TierEntry) -> Ordering {
    a.hit_count
        .cmp(&b.hit_count)
        .then_with(|| a.expires_at.cmp(&b.expires_at))
}
