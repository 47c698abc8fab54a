//! Response cache orchestrator: tier sequencing, writes and telemetry

use crate::cache::{
    clock::{Clock, SystemClock},
    config::CacheConfig,
    entry::TierEntry,
    invalidation::{InvalidationEvent, InvalidationReason},
    key::PatternKeyDeriver,
    template::TemplateEngine,
    tier::TierTable,
    types::{
        AudioRequirement, CacheStats, CacheTier, CachedResponse, EvictionStats, LearningStats,
        OverallStats, TemplateStats, TierStats,
    },
};
use crate::error::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Multi-level response cache shared by every conversation session.
///
/// - Tier1 and tier2 live behind one `RwLock`, held only for map operations
/// - Lookups mutate hit counts, so they take the write lock
/// - Request/hit counters are atomics; `stats()` only reads the lock for
///   entry counts
/// - Expiry is checked on every read; the physical purge is amortized by
///   `SweepPolicy`
pub struct ResponseCache {
    /// Cache configuration
    pub(crate) config: CacheConfig,

    /// Both tiers behind one lock
    pub(crate) store: RwLock<CacheStore>,

    pub(crate) keys: PatternKeyDeriver,

    templates: TemplateEngine,

    pub(crate) clock: Arc<dyn Clock>,

    pub(crate) counters: Counters,

    latency: Mutex<LatencyTracker>,
}

/// Tier tables plus the sweep operation counter
pub(crate) struct CacheStore {
    pub(crate) tier1: TierTable,
    pub(crate) tier2: TierTable,
    ops: u64,
}

impl CacheStore {
    pub(crate) fn tier_mut(&mut self, tier: CacheTier) -> Option<&mut TierTable> {
        match tier {
            CacheTier::Tier1 => Some(&mut self.tier1),
            CacheTier::Tier2 => Some(&mut self.tier2),
            CacheTier::Tier3 => None,
        }
    }

    /// Count one operation; on sweep ticks purge tiers above the high-water mark
    fn tick(&mut self, config: &CacheConfig, now: DateTime<Utc>) -> u64 {
        self.ops = self.ops.wrapping_add(1);
        if !config.sweep.is_due(self.ops) {
            return 0;
        }

        let mut purged = 0;
        for table in [&mut self.tier1, &mut self.tier2] {
            if config.sweep.above_high_water(table.len(), table.max_entries()) {
                let expired = table.purge_expired(now);
                if !expired.is_empty() {
                    debug!("Sweep purged {} expired {} entries", expired.len(), table.tier());
                }
                purged += expired.len() as u64;
            }
        }
        purged
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    requests: AtomicU64,
    tier1_hits: AtomicU64,
    tier2_hits: AtomicU64,
    tier3_hits: AtomicU64,
    misses: AtomicU64,
    pub(crate) recorded: AtomicU64,
    pub(crate) prediction_matches: AtomicU64,
    expired: AtomicU64,
    capacity: AtomicU64,
}

/// Rolling latency windows for the three tiers
struct LatencyTracker {
    capacity: usize,
    windows: [LatencyWindow; 3],
}

#[derive(Default)]
struct LatencyWindow {
    samples: VecDeque<f64>,
    sum: f64,
}

impl LatencyTracker {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: Default::default(),
        }
    }

    fn slot(tier: CacheTier) -> usize {
        match tier {
            CacheTier::Tier1 => 0,
            CacheTier::Tier2 => 1,
            CacheTier::Tier3 => 2,
        }
    }

    fn record(&mut self, tier: CacheTier, millis: f64) {
        let window = &mut self.windows[Self::slot(tier)];
        window.samples.push_back(millis);
        window.sum += millis;
        while window.samples.len() > self.capacity {
            if let Some(old) = window.samples.pop_front() {
                window.sum -= old;
            }
        }
    }

    fn average(&self, tier: CacheTier) -> f64 {
        let window = &self.windows[Self::slot(tier)];
        if window.samples.is_empty() {
            0.0
        } else {
            (window.sum / window.samples.len() as f64).max(0.0)
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ResponseCache {
    /// Create a cache using the wall clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache after validating the configuration
    pub fn try_new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Create a cache with an injected time source
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        info!("Initializing response cache with config: {:?}", config);

        let store = CacheStore {
            tier1: TierTable::new(CacheTier::Tier1, config.tier1_max_entries),
            tier2: TierTable::new(CacheTier::Tier2, config.tier2_max_entries),
            ops: 0,
        };

        Self {
            keys: PatternKeyDeriver::new(config.pattern_prefix_len),
            latency: Mutex::new(LatencyTracker::new(config.latency_window)),
            templates: TemplateEngine::default(),
            store: RwLock::new(store),
            counters: Counters::default(),
            clock,
            config,
        }
    }

    /// Replace the tier3 template set
    pub fn with_templates(mut self, templates: TemplateEngine) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn key_deriver(&self) -> &PatternKeyDeriver {
        &self.keys
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Tier1 then tier2 lookup for the live conversation path.
    ///
    /// Never consults templates and never waits on anything slower than a map
    /// access. A hit increments the entry's hit count.
    pub async fn fast_lookup(
        &self,
        stage: &str,
        user_input: &str,
        topic: Option<&str>,
    ) -> Option<CachedResponse> {
        self.fast_lookup_with(stage, user_input, topic, AudioRequirement::Optional)
            .await
    }

    /// [`fast_lookup`](Self::fast_lookup) with an explicit audio requirement
    pub async fn fast_lookup_with(
        &self,
        stage: &str,
        user_input: &str,
        topic: Option<&str>,
        audio: AudioRequirement,
    ) -> Option<CachedResponse> {
        let started = Instant::now();
        self.counters.requests.fetch_add(1, Ordering::SeqCst);

        let exact_key = self.keys.exact_key(user_input);
        if exact_key.is_empty() {
            debug!("Cache miss: input normalizes to nothing");
            self.counters.misses.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        let pattern_key = self.keys.derive(stage, user_input, topic);
        let now = self.clock.now();

        let found = {
            let mut guard = self.store.write().await;
            let store = &mut *guard;
            let purged = store.tick(&self.config, now);
            self.counters.expired.fetch_add(purged, Ordering::Relaxed);

            match store.tier1.lookup(&exact_key, now, audio) {
                Some(entry) => Some((CacheTier::Tier1, Self::snapshot(entry))),
                None => store
                    .tier2
                    .lookup(&pattern_key, now, audio)
                    .map(|entry| (CacheTier::Tier2, Self::snapshot(entry))),
            }
        };

        match found {
            Some((tier, (text, audio, hit_count))) => {
                let counter = match tier {
                    CacheTier::Tier1 => &self.counters.tier1_hits,
                    _ => &self.counters.tier2_hits,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                self.record_latency(tier, started);
                debug!("Cache hit ({}): {}", tier, exact_key);

                Some(CachedResponse {
                    text,
                    audio,
                    stage: stage.to_string(),
                    source: tier,
                    cache_timestamp: now,
                    hit_count,
                    topic: topic.map(str::to_string),
                })
            }
            None => {
                debug!("Cache miss: {}", exact_key);
                self.counters.misses.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    fn snapshot(entry: &TierEntry) -> (String, Option<Bytes>, u64) {
        (
            entry.response_text.clone(),
            entry.audio.clone(),
            entry.hit_count,
        )
    }

    /// Write a generated response into tier1 or tier2.
    ///
    /// `audio` may be `None` while synthesis is still running; fill it in
    /// later with [`backfill_audio`](Self::backfill_audio). Tier3 is not a
    /// write target and is ignored with a warning.
    pub async fn cache_response(
        &self,
        stage: &str,
        user_input: &str,
        response_text: &str,
        audio: Option<Bytes>,
        topic: Option<&str>,
        level: CacheTier,
    ) {
        let exact_key = self.keys.exact_key(user_input);
        if exact_key.is_empty() {
            debug!("Skipping {} write: input normalizes to nothing", level);
            return;
        }

        let (key, snippet) = match level {
            CacheTier::Tier1 => (exact_key, None),
            CacheTier::Tier2 => {
                let snippet = self.keys.snippet(user_input);
                let key = self.keys.derive_from_snippet(stage, &snippet, topic);
                (key, Some(snippet))
            }
            CacheTier::Tier3 => {
                warn!("Ignoring cache write to tier3: templates are static");
                return;
            }
        };

        let now = self.clock.now();
        let mut store = self.store.write().await;
        let purged = store.tick(&self.config, now);
        self.counters.expired.fetch_add(purged, Ordering::Relaxed);

        self.write_locked(&mut store, level, key, response_text, audio, now, snippet);
        debug!("Cached {} response for stage {}", level, stage);
    }

    /// Insert into a tier while the store lock is held
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_locked(
        &self,
        store: &mut CacheStore,
        tier: CacheTier,
        key: String,
        response_text: &str,
        audio: Option<Bytes>,
        now: DateTime<Utc>,
        snippet: Option<String>,
    ) {
        let expires_at = TierEntry::expiry_from(now, self.config.ttl_with_jitter());
        if let Some(table) = store.tier_mut(tier) {
            let evicted = table.write(
                key,
                response_text.to_string(),
                audio,
                now,
                expires_at,
                snippet,
            );
            self.counters
                .capacity
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        }
    }

    /// Fire-and-forget [`cache_response`](Self::cache_response)
    pub fn spawn_cache_response(
        self: &Arc<Self>,
        stage: String,
        user_input: String,
        response_text: String,
        audio: Option<Bytes>,
        topic: Option<String>,
        level: CacheTier,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            cache
                .cache_response(
                    &stage,
                    &user_input,
                    &response_text,
                    audio,
                    topic.as_deref(),
                    level,
                )
                .await;
        })
    }

    /// Attach synthesized audio to an entry written earlier without it.
    ///
    /// Tries tier1, then tier2. Returns the tier that was updated, or `None`
    /// when neither holds the key (for example after eviction).
    pub async fn backfill_audio(
        &self,
        stage: &str,
        user_input: &str,
        audio: Bytes,
        topic: Option<&str>,
    ) -> Option<CacheTier> {
        let exact_key = self.keys.exact_key(user_input);
        let pattern_key = self.keys.derive(stage, user_input, topic);

        let mut store = self.store.write().await;
        if !exact_key.is_empty() && store.tier1.backfill_audio(&exact_key, audio.clone()) {
            return Some(CacheTier::Tier1);
        }
        if store.tier2.backfill_audio(&pattern_key, audio) {
            return Some(CacheTier::Tier2);
        }

        debug!("Audio backfill found no entry for stage {}", stage);
        None
    }

    /// Fire-and-forget [`backfill_audio`](Self::backfill_audio)
    pub fn spawn_backfill_audio(
        self: &Arc<Self>,
        stage: String,
        user_input: String,
        audio: Bytes,
        topic: Option<String>,
    ) -> JoinHandle<Option<CacheTier>> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            cache
                .backfill_audio(&stage, &user_input, audio, topic.as_deref())
                .await
        })
    }

    /// Tier3 fallback for callers whose fast lookup missed.
    ///
    /// Renders a stage template; carries no audio.
    pub fn template_fallback(
        &self,
        stage: &str,
        user_name: &str,
        topic: Option<&str>,
    ) -> Option<CachedResponse> {
        let started = Instant::now();
        let text = self.templates.select_template(stage, user_name, topic)?;

        let hits = self.counters.tier3_hits.fetch_add(1, Ordering::SeqCst) + 1;
        self.record_latency(CacheTier::Tier3, started);

        Some(CachedResponse {
            text,
            audio: None,
            stage: stage.to_string(),
            source: CacheTier::Tier3,
            cache_timestamp: self.clock.now(),
            hit_count: hits,
            topic: topic.map(str::to_string),
        })
    }

    fn record_latency(&self, tier: CacheTier, started: Instant) {
        let millis = started.elapsed().as_secs_f64() * 1000.0;
        let mut latency = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        latency.record(tier, millis);
    }

    /// Telemetry snapshot. Never fails; only entry counts touch the lock.
    pub async fn stats(&self) -> CacheStats {
        // hits before requests keeps total_hits <= total_requests under load
        let tier1_hits = self.counters.tier1_hits.load(Ordering::SeqCst);
        let tier2_hits = self.counters.tier2_hits.load(Ordering::SeqCst);
        let misses = self.counters.misses.load(Ordering::SeqCst);
        let total_requests = self.counters.requests.load(Ordering::SeqCst);
        let tier3_hits = self.counters.tier3_hits.load(Ordering::SeqCst);

        let total_hits = tier1_hits + tier2_hits;
        let hit_rate_percent = if total_requests == 0 {
            0.0
        } else {
            round2(total_hits as f64 / total_requests as f64 * 100.0)
        };

        let (tier1_entries, tier2_entries) = {
            let store = self.store.read().await;
            (store.tier1.len(), store.tier2.len())
        };

        let (avg1, avg2, avg3) = {
            let latency = self.latency.lock().unwrap_or_else(|e| e.into_inner());
            (
                latency.average(CacheTier::Tier1),
                latency.average(CacheTier::Tier2),
                latency.average(CacheTier::Tier3),
            )
        };

        CacheStats {
            tier1: TierStats {
                hits: tier1_hits,
                entries: tier1_entries,
                avg_latency_ms: round2(avg1),
            },
            tier2: TierStats {
                hits: tier2_hits,
                entries: tier2_entries,
                avg_latency_ms: round2(avg2),
            },
            tier3: TemplateStats {
                hits: tier3_hits,
                avg_latency_ms: round2(avg3),
            },
            overall: OverallStats {
                total_requests,
                total_hits,
                misses,
                hit_rate_percent,
            },
            learning: LearningStats {
                recorded: self.counters.recorded.load(Ordering::Relaxed),
                prediction_matches: self.counters.prediction_matches.load(Ordering::Relaxed),
            },
            evictions: EvictionStats {
                expired: self.counters.expired.load(Ordering::Relaxed),
                capacity: self.counters.capacity.load(Ordering::Relaxed),
            },
        }
    }

    /// Purge expired entries from both tiers now, outside the sweep cadence
    pub async fn purge_expired(&self) -> Vec<InvalidationEvent> {
        let now = self.clock.now();
        let mut guard = self.store.write().await;
        let store = &mut *guard;
        let mut events = Vec::new();

        for table in [&mut store.tier1, &mut store.tier2] {
            let expired = table.purge_expired(now);
            if !expired.is_empty() {
                self.counters
                    .expired
                    .fetch_add(expired.len() as u64, Ordering::Relaxed);
                events.push(InvalidationEvent::new(
                    table.tier(),
                    InvalidationReason::Expired,
                    expired,
                    now,
                ));
            }
        }

        events
    }

    /// Clear one tier, or both when `level` is `None`.
    ///
    /// Returns one manual invalidation event per tier that held entries.
    pub async fn clear(&self, level: Option<CacheTier>) -> Vec<InvalidationEvent> {
        let now = self.clock.now();
        let mut guard = self.store.write().await;
        let store = &mut *guard;

        let tables = match level {
            None => vec![&mut store.tier1, &mut store.tier2],
            Some(CacheTier::Tier1) => vec![&mut store.tier1],
            Some(CacheTier::Tier2) => vec![&mut store.tier2],
            Some(CacheTier::Tier3) => {
                warn!("Ignoring clear of tier3: templates are static");
                Vec::new()
            }
        };

        let mut events = Vec::new();
        for table in tables {
            let keys = table.clear();
            if keys.is_empty() {
                continue;
            }
            info!("Cleared {} entries from {}", keys.len(), table.tier());
            events.push(InvalidationEvent::new(
                table.tier(),
                InvalidationReason::Manual,
                keys,
                now,
            ));
        }
        events
    }

    /// Physical entry count of a tier (tier3 has none)
    pub async fn len(&self, tier: CacheTier) -> usize {
        let store = self.store.read().await;
        match tier {
            CacheTier::Tier1 => store.tier1.len(),
            CacheTier::Tier2 => store.tier2.len(),
            CacheTier::Tier3 => 0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        let store = self.store.read().await;
        store.tier1.is_empty() && store.tier2.is_empty()
    }

    /// Hit count of a tier entry, without counting a hit
    pub async fn peek_hit_count(
        &self,
        tier: CacheTier,
        stage: &str,
        user_input: &str,
        topic: Option<&str>,
    ) -> Option<u64> {
        let store = self.store.read().await;
        match tier {
            CacheTier::Tier1 => store
                .tier1
                .peek(&self.keys.exact_key(user_input))
                .map(|e| e.hit_count),
            CacheTier::Tier2 => store
                .tier2
                .peek(&self.keys.derive(stage, user_input, topic))
                .map(|e| e.hit_count),
            CacheTier::Tier3 => None,
        }
    }
}

/// Start the background purge task if `enable_auto_cleanup` is set
pub fn start_auto_cleanup(cache: Arc<ResponseCache>) -> Option<JoinHandle<()>> {
    if !cache.config.enable_auto_cleanup {
        return None;
    }
    let interval = cache.config.cleanup_interval;
    if interval.is_zero() {
        warn!("Auto cleanup disabled: cleanup_interval is zero");
        return None;
    }

    info!("Starting automatic cache cleanup task (interval: {:?})", interval);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let events = cache.purge_expired().await;
            if !events.is_empty() {
                debug!("Auto cleanup: {} events", events.len());
            }
        }
    }))
}
