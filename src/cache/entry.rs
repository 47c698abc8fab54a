//! Tier entries with TTL and hit-count metadata

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One slot in the exact or pattern tier
#[derive(Debug, Clone)]
pub struct TierEntry {
    /// Normalized utterance (tier1) or pattern fingerprint (tier2)
    pub key: String,

    /// Cached textual reply
    pub response_text: String,

    /// Pre-synthesized audio; `None` until the audio is backfilled
    pub audio: Option<Bytes>,

    pub created_at: DateTime<Utc>,

    /// Absolute expiry; the entry is dead once `now > expires_at`
    pub expires_at: DateTime<Utc>,

    /// Successful lookups since the last rewrite
    pub hit_count: u64,

    /// Truncated normalized text behind a tier2 fingerprint
    pub pattern_snippet: Option<String>,
}

impl TierEntry {
    pub fn new(
        key: String,
        response_text: String,
        audio: Option<Bytes>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        pattern_snippet: Option<String>,
    ) -> Self {
        Self {
            key,
            response_text,
            audio,
            created_at,
            expires_at,
            hit_count: 0,
            pattern_snippet,
        }
    }

    /// Expiry for a write at `now` with the given TTL, saturating at the
    /// largest representable instant
    pub fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Live means `expires_at >= now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at >= now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_live(now)
    }

    /// Audio is present and non-empty
    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// Count a successful lookup
    pub fn mark_hit(&mut self) -> u64 {
        self.hit_count += 1;
        self.hit_count
    }

    /// Time until expiration, `None` once expired
    pub fn time_until_expiration(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at - now).to_std().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(now: DateTime<Utc>, ttl_secs: u64) -> TierEntry {
        TierEntry::new(
            "hello".to_string(),
            "Hi!".to_string(),
            None,
            now,
            TierEntry::expiry_from(now, Duration::from_secs(ttl_secs)),
            None,
        )
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let e = entry(now, 1);
        assert!(e.is_live(now));
        assert!(e.is_live(e.expires_at));
        assert!(e.is_expired(e.expires_at + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_expiry_saturates_on_huge_ttl() {
        let now = Utc::now();
        let expiry = TierEntry::expiry_from(now, Duration::from_secs(10_000_000_000_000));
        assert_eq!(expiry, DateTime::<Utc>::MAX_UTC);

        let expiry = TierEntry::expiry_from(now, Duration::MAX);
        assert_eq!(expiry, DateTime::<Utc>::MAX_UTC);
        assert!(entry(now, 60).is_live(now));
    }

    #[test]
    fn test_mark_hit() {
        let mut e = entry(Utc::now(), 60);
        assert_eq!(e.hit_count, 0);
        assert_eq!(e.mark_hit(), 1);
        assert_eq!(e.mark_hit(), 2);
    }

    #[test]
    fn test_has_audio() {
        let mut e = entry(Utc::now(), 60);
        assert!(!e.has_audio());
        e.audio = Some(Bytes::new());
        assert!(!e.has_audio());
        e.audio = Some(Bytes::from_static(b"RIFF"));
        assert!(e.has_audio());
    }

    #[test]
    fn test_time_until_expiration() {
        let now = Utc::now();
        let e = entry(now, 60);
        assert_eq!(e.time_until_expiration(now), Some(Duration::from_secs(60)));
        assert_eq!(
            e.time_until_expiration(now + chrono::Duration::seconds(61)),
            None
        );
    }
}
