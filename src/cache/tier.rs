//! Bounded, TTL-gated table backing the exact and pattern tiers

use crate::cache::entry::TierEntry;
use crate::cache::invalidation::{eviction_batch, eviction_order};
use crate::cache::types::{AudioRequirement, CacheTier};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Typed key -> entry table for one tier.
///
/// Not synchronized on its own; `ResponseCache` keeps both tiers behind one
/// lock. Reads through [`lookup`](Self::lookup) mutate the entry's hit count.
#[derive(Debug)]
pub struct TierTable {
    tier: CacheTier,
    max_entries: usize,
    entries: HashMap<String, TierEntry>,
}

impl TierTable {
    pub fn new(tier: CacheTier, max_entries: usize) -> Self {
        Self {
            tier,
            max_entries,
            entries: HashMap::with_capacity(max_entries.min(1024)),
        }
    }

    pub fn tier(&self) -> CacheTier {
        self.tier
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Physical entry count, expired-but-unpurged entries included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read an entry without counting a hit or checking expiry
    pub fn peek(&self, key: &str) -> Option<&TierEntry> {
        self.entries.get(key)
    }

    /// Return a live entry and increment its hit count.
    ///
    /// Expired entries are reported as a miss but left in place for the sweep.
    /// With `AudioRequirement::Required`, entries still waiting for audio are
    /// misses too and their hit count is untouched.
    pub fn lookup(
        &mut self,
        key: &str,
        now: DateTime<Utc>,
        audio: AudioRequirement,
    ) -> Option<&TierEntry> {
        let entry = self.entries.get_mut(key)?;
        if entry.is_expired(now) {
            debug!("{} entry expired: {}", self.tier, key);
            return None;
        }
        if audio == AudioRequirement::Required && !entry.has_audio() {
            debug!("{} entry has no audio yet: {}", self.tier, key);
            return None;
        }
        entry.mark_hit();
        Some(entry)
    }

    /// Upsert an entry. Returns the keys evicted to make room.
    ///
    /// Tier1 rewrites reset the hit count. Tier2 rewrites of a live bucket keep
    /// it. Writing the same text without audio keeps audio already cached.
    pub fn write(
        &mut self,
        key: String,
        response_text: String,
        audio: Option<Bytes>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        pattern_snippet: Option<String>,
    ) -> Vec<String> {
        let mut evicted = Vec::new();
        let mut hit_count = 0;
        let mut audio = audio;

        match self.entries.get(&key) {
            Some(existing) => {
                if self.tier == CacheTier::Tier2 && existing.is_live(now) {
                    hit_count = existing.hit_count;
                }
                if audio.is_none() && existing.response_text == response_text {
                    audio = existing.audio.clone();
                }
            }
            None => {
                if self.entries.len() >= self.max_entries {
                    evicted = self.evict();
                    if self.entries.len() >= self.max_entries {
                        warn!(
                            "{} eviction freed no space ({} entries), writing over capacity",
                            self.tier,
                            self.entries.len()
                        );
                    }
                }
            }
        }

        let mut entry = TierEntry::new(
            key.clone(),
            response_text,
            audio,
            now,
            expires_at,
            pattern_snippet,
        );
        entry.hit_count = hit_count;
        self.entries.insert(key, entry);

        evicted
    }

    /// Replace only the audio of an existing entry
    pub fn backfill_audio(&mut self, key: &str, audio: Bytes) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.audio = Some(audio);
                true
            }
            None => false,
        }
    }

    /// Remove every entry with `expires_at < now`
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }

    /// Drop the `ceil(max_entries / 10)` least-used, soonest-expiring entries
    fn evict(&mut self) -> Vec<String> {
        let mut ranked: Vec<&TierEntry> = self.entries.values().collect();
        ranked.sort_by(|a, b| eviction_order(a, b));

        let victims: Vec<String> = ranked
            .into_iter()
            .take(eviction_batch(self.max_entries))
            .map(|e| e.key.clone())
            .collect();

        for key in &victims {
            self.entries.remove(key);
        }
        debug!("{} evicted {} entries at capacity", self.tier, victims.len());
        victims
    }

    /// Remove everything, returning the dropped keys
    pub fn clear(&mut self) -> Vec<String> {
        self.entries.drain().map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn write(table: &mut TierTable, key: &str, now: DateTime<Utc>, ttl_secs: i64) -> Vec<String> {
        table.write(
            key.to_string(),
            format!("reply to {}", key),
            None,
            now,
            now + Duration::seconds(ttl_secs),
            None,
        )
    }

    #[test]
    fn test_lookup_increments_hit_count() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 10);
        write(&mut table, "hello", now, 60);

        assert_eq!(table.lookup("hello", now, AudioRequirement::Optional).unwrap().hit_count, 1);
        assert_eq!(table.lookup("hello", now, AudioRequirement::Optional).unwrap().hit_count, 2);
        assert_eq!(table.peek("hello").unwrap().hit_count, 2);
        assert!(table.lookup("missing", now, AudioRequirement::Optional).is_none());
    }

    #[test]
    fn test_lookup_respects_expiry_without_removing() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 10);
        write(&mut table, "hello", now, 1);

        assert!(table.lookup("hello", now + Duration::seconds(1), AudioRequirement::Optional).is_some());
        assert!(table.lookup("hello", now + Duration::seconds(2), AudioRequirement::Optional).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_tier1_rewrite_resets_hits() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 10);
        write(&mut table, "hello", now, 60);
        table.lookup("hello", now, AudioRequirement::Optional);
        write(&mut table, "hello", now, 60);
        assert_eq!(table.peek("hello").unwrap().hit_count, 0);
    }

    #[test]
    fn test_tier2_rewrite_keeps_hits_of_live_bucket() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier2, 10);
        write(&mut table, "bucket", now, 60);
        table.lookup("bucket", now, AudioRequirement::Optional);
        table.lookup("bucket", now, AudioRequirement::Optional);
        write(&mut table, "bucket", now, 60);
        assert_eq!(table.peek("bucket").unwrap().hit_count, 2);

        // expired bucket starts over
        let later = now + Duration::seconds(120);
        write(&mut table, "bucket", later, 60);
        assert_eq!(table.peek("bucket").unwrap().hit_count, 0);
    }

    #[test]
    fn test_rewrite_same_text_keeps_audio() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 10);
        write(&mut table, "hello", now, 60);
        table.backfill_audio("hello", Bytes::from_static(b"audio"));
        write(&mut table, "hello", now, 60);
        assert!(table.peek("hello").unwrap().has_audio());

        table.write("hello".into(), "new text".into(), None, now, now + Duration::seconds(60), None);
        assert!(!table.peek("hello").unwrap().has_audio());
    }

    #[test]
    fn test_eviction_at_capacity_spares_new_entry() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 10);
        for i in 0..10 {
            write(&mut table, &format!("k{}", i), now, 60 + i);
        }
        for i in 1..10 {
            table.lookup(&format!("k{}", i), now, AudioRequirement::Optional);
        }

        let evicted = write(&mut table, "fresh", now, 60);
        assert_eq!(evicted, vec!["k0".to_string()]);
        assert_eq!(table.len(), 10);
        assert!(table.peek("fresh").is_some());
    }

    #[test]
    fn test_eviction_tie_breaks_on_expiry() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 2);
        write(&mut table, "late", now, 100);
        write(&mut table, "soon", now, 10);
        let evicted = write(&mut table, "new", now, 50);
        assert_eq!(evicted, vec!["soon".to_string()]);
    }

    #[test]
    fn test_required_audio_skips_pending_entry() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 10);
        write(&mut table, "hello", now, 60);

        assert!(table.lookup("hello", now, AudioRequirement::Required).is_none());
        assert_eq!(table.peek("hello").unwrap().hit_count, 0);

        table.backfill_audio("hello", Bytes::from_static(b"audio"));
        let hit = table.lookup("hello", now, AudioRequirement::Required).unwrap();
        assert_eq!(hit.hit_count, 1);
        assert_eq!(hit.response_text, "reply to hello");
    }

    #[test]
    fn test_backfill_missing_key_is_noop() {
        let mut table = TierTable::new(CacheTier::Tier2, 10);
        assert!(!table.backfill_audio("nope", Bytes::from_static(b"x")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let now = Utc::now();
        let mut table = TierTable::new(CacheTier::Tier1, 10);
        write(&mut table, "short", now, 1);
        write(&mut table, "long", now, 600);

        let purged = table.purge_expired(now + Duration::seconds(5));
        assert_eq!(purged, vec!["short".to_string()]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.clear(), vec!["long".to_string()]);
        assert!(table.is_empty());
    }
}
