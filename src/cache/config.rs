//! Configuration for the response cache

use crate::cache::invalidation::SweepPolicy;
use crate::cache::key::DEFAULT_PATTERN_PREFIX_LEN;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

const ENV_TTL_SECS: &str = "TUTOR_CACHE_TTL_SECS";
const ENV_TIER1_MAX_ENTRIES: &str = "TUTOR_CACHE_TIER1_MAX_ENTRIES";
const ENV_TIER2_MAX_ENTRIES: &str = "TUTOR_CACHE_TIER2_MAX_ENTRIES";
const ENV_TTL_JITTER: &str = "TUTOR_CACHE_TTL_JITTER";
const ENV_SWEEP_EVERY: &str = "TUTOR_CACHE_SWEEP_EVERY";
const ENV_HIGH_WATER: &str = "TUTOR_CACHE_HIGH_WATER";
const ENV_CLEANUP_INTERVAL_SECS: &str = "TUTOR_CACHE_CLEANUP_INTERVAL_SECS";

/// Longest accepted TTL (one year)
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for the response cache
///
/// Defaults follow a live conversation session: one hour TTL, a few hundred
/// exact phrases and about a thousand pattern buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live applied on every write
    pub ttl: Duration,

    /// Capacity of the exact-match tier
    pub tier1_max_entries: usize,

    /// Capacity of the pattern tier
    pub tier2_max_entries: usize,

    /// TTL jitter factor (0.0 - 1.0)
    /// Only ever lengthens the TTL, so an entry never expires before `ttl`.
    pub ttl_jitter: f64,

    /// Amortized expiry sweep cadence
    pub sweep: SweepPolicy,

    /// Run a background purge task (see `start_auto_cleanup`)
    pub enable_auto_cleanup: bool,

    /// Interval for the background purge task
    pub cleanup_interval: Duration,

    /// Normalized characters that feed a pattern fingerprint
    pub pattern_prefix_len: usize,

    /// Similarity at which a prediction counts as matching the real response
    pub prediction_match_threshold: f64,

    /// Samples kept per tier for rolling average latency
    pub latency_window: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            tier1_max_entries: 500,
            tier2_max_entries: 1000,
            ttl_jitter: 0.0,
            sweep: SweepPolicy::default(),
            enable_auto_cleanup: false,
            cleanup_interval: Duration::from_secs(300),
            pattern_prefix_len: DEFAULT_PATTERN_PREFIX_LEN,
            prediction_match_threshold: 0.82,
            latency_window: 100,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tier1_max_entries == 0 || self.tier2_max_entries == 0 {
            return Err(CacheError::ConfigError(
                "tier max_entries must be greater than 0".to_string(),
            ));
        }

        if self.ttl.is_zero() {
            return Err(CacheError::ConfigError(
                "ttl must be greater than 0".to_string(),
            ));
        }

        if self.ttl > MAX_TTL {
            return Err(CacheError::ConfigError(format!(
                "ttl must be at most {} seconds",
                MAX_TTL.as_secs()
            )));
        }

        if self.enable_auto_cleanup && self.cleanup_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "cleanup_interval must be greater than 0 when auto cleanup is enabled".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::ConfigError(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.prediction_match_threshold) {
            return Err(CacheError::ConfigError(
                "prediction_match_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.pattern_prefix_len == 0 {
            return Err(CacheError::ConfigError(
                "pattern_prefix_len must be greater than 0".to_string(),
            ));
        }

        if self.latency_window == 0 {
            return Err(CacheError::ConfigError(
                "latency_window must be greater than 0".to_string(),
            ));
        }

        self.sweep.validate()
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.ttl;
        }

        let base_secs = self.ttl.as_secs_f64();
        let jitter = rand::random::<f64>() * base_secs * self.ttl_jitter;

        Duration::try_from_secs_f64(base_secs + jitter).unwrap_or(self.ttl)
    }

    /// Load configuration from the environment (and `.env` if present).
    ///
    /// Unset variables keep their defaults; malformed values are an error.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = CacheConfig::builder();

        if let Some(secs) = env_parse::<u64>(ENV_TTL_SECS)? {
            builder = builder.ttl(Duration::from_secs(secs));
        }
        if let Some(max) = env_parse::<usize>(ENV_TIER1_MAX_ENTRIES)? {
            builder = builder.tier1_max_entries(max);
        }
        if let Some(max) = env_parse::<usize>(ENV_TIER2_MAX_ENTRIES)? {
            builder = builder.tier2_max_entries(max);
        }
        if let Some(jitter) = env_parse::<f64>(ENV_TTL_JITTER)? {
            builder = builder.ttl_jitter(jitter);
        }

        let defaults = SweepPolicy::default();
        let every_ops = env_parse::<u64>(ENV_SWEEP_EVERY)?.unwrap_or(defaults.every_ops);
        let high_water = env_parse::<f64>(ENV_HIGH_WATER)?.unwrap_or(defaults.high_water_ratio);
        builder = builder.sweep(SweepPolicy::new(every_ops, high_water));

        if let Some(secs) = env_parse::<u64>(ENV_CLEANUP_INTERVAL_SECS)? {
            builder = builder
                .enable_auto_cleanup(true)
                .cleanup_interval(Duration::from_secs(secs));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CacheError::ConfigError(format!("{} has invalid value {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    ttl: Option<Duration>,
    tier1_max_entries: Option<usize>,
    tier2_max_entries: Option<usize>,
    ttl_jitter: Option<f64>,
    sweep: Option<SweepPolicy>,
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
    pattern_prefix_len: Option<usize>,
    prediction_match_threshold: Option<f64>,
    latency_window: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set TTL for cache entries
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set capacity of the exact-match tier
    pub fn tier1_max_entries(mut self, max: usize) -> Self {
        self.tier1_max_entries = Some(max);
        self
    }

    /// Set capacity of the pattern tier
    pub fn tier2_max_entries(mut self, max: usize) -> Self {
        self.tier2_max_entries = Some(max);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set the amortized sweep policy
    pub fn sweep(mut self, sweep: SweepPolicy) -> Self {
        self.sweep = Some(sweep);
        self
    }

    /// Enable or disable the background purge task
    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    /// Set cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    pub fn pattern_prefix_len(mut self, len: usize) -> Self {
        self.pattern_prefix_len = Some(len);
        self
    }

    pub fn prediction_match_threshold(mut self, threshold: f64) -> Self {
        self.prediction_match_threshold = Some(threshold);
        self
    }

    pub fn latency_window(mut self, samples: usize) -> Self {
        self.latency_window = Some(samples);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            ttl: self.ttl.unwrap_or(defaults.ttl),
            tier1_max_entries: self.tier1_max_entries.unwrap_or(defaults.tier1_max_entries),
            tier2_max_entries: self.tier2_max_entries.unwrap_or(defaults.tier2_max_entries),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            sweep: self.sweep.unwrap_or(defaults.sweep),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
            pattern_prefix_len: self.pattern_prefix_len.unwrap_or(defaults.pattern_prefix_len),
            prediction_match_threshold: self
                .prediction_match_threshold
                .unwrap_or(defaults.prediction_match_threshold),
            latency_window: self.latency_window.unwrap_or(defaults.latency_window),
        }
    }
}

/// Preset configurations
impl CacheConfig {
    /// Short-lived sessions: 5 minute TTL, smaller tiers
    pub fn realtime() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            tier1_max_entries: 250,
            tier2_max_entries: 500,
            ..Default::default()
        }
    }

    /// Memory-constrained hosts
    pub fn small() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            tier1_max_entries: 100,
            tier2_max_entries: 200,
            ..Default::default()
        }
    }

    /// Many concurrent classrooms on one process
    pub fn large() -> Self {
        Self {
            ttl: Duration::from_secs(7200),
            tier1_max_entries: 5_000,
            tier2_max_entries: 10_000,
            enable_auto_cleanup: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.tier1_max_entries, 500);
        assert_eq!(config.tier2_max_entries, 1000);
        assert_eq!(config.pattern_prefix_len, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid = CacheConfig::default();
        invalid.tier1_max_entries = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::default();
        invalid.ttl_jitter = 1.5;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::default();
        invalid.ttl = Duration::ZERO;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::default();
        invalid.sweep = SweepPolicy::new(0, 0.8);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .ttl(Duration::from_secs(60))
            .tier1_max_entries(10)
            .tier2_max_entries(20)
            .sweep(SweepPolicy::new(5, 0.5))
            .build();

        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.tier1_max_entries, 10);
        assert_eq!(config.tier2_max_entries, 20);
        assert_eq!(config.sweep.every_ops, 5);
        assert_eq!(config.prediction_match_threshold, 0.82);
    }

    #[test]
    fn test_ttl_with_jitter_never_shortens() {
        let config = CacheConfig {
            ttl: Duration::from_secs(100),
            ttl_jitter: 0.1,
            ..Default::default()
        };

        for _ in 0..50 {
            let ttl = config.ttl_with_jitter().as_secs_f64();
            assert!(ttl >= 100.0);
            assert!(ttl <= 110.0);
        }

        let no_jitter = CacheConfig::default();
        assert_eq!(no_jitter.ttl_with_jitter(), no_jitter.ttl);
    }

    #[test]
    fn test_validate_rejects_unbounded_ttl() {
        let huge = CacheConfig::builder()
            .ttl(Duration::from_secs(10_000_000_000_000))
            .build();
        assert!(matches!(huge.validate(), Err(CacheError::ConfigError(_))));

        let max = CacheConfig::builder().ttl(MAX_TTL).build();
        assert!(max.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_cleanup_interval() {
        let config = CacheConfig::builder()
            .enable_auto_cleanup(true)
            .cleanup_interval(Duration::ZERO)
            .build();
        assert!(matches!(config.validate(), Err(CacheError::ConfigError(_))));

        let disabled = CacheConfig::builder().cleanup_interval(Duration::ZERO).build();
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_jitter_on_huge_ttl_does_not_panic() {
        let config = CacheConfig::builder()
            .ttl(Duration::MAX)
            .ttl_jitter(1.0)
            .build();
        assert!(config.ttl_with_jitter() >= Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn test_preset_configs() {
        assert_eq!(CacheConfig::realtime().ttl, Duration::from_secs(300));
        assert_eq!(CacheConfig::small().tier1_max_entries, 100);
        assert!(CacheConfig::large().enable_auto_cleanup);
        assert!(CacheConfig::large().validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        // Single test touches the env to avoid races between test threads
        std::env::set_var(ENV_TTL_SECS, "42");
        std::env::set_var(ENV_TIER1_MAX_ENTRIES, "7");
        std::env::set_var(ENV_SWEEP_EVERY, "3");
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.ttl, Duration::from_secs(42));
        assert_eq!(config.tier1_max_entries, 7);
        assert_eq!(config.sweep.every_ops, 3);

        std::env::set_var(ENV_TIER2_MAX_ENTRIES, "lots");
        assert!(matches!(
            CacheConfig::from_env(),
            Err(CacheError::ConfigError(_))
        ));

        std::env::remove_var(ENV_TIER2_MAX_ENTRIES);
        std::env::set_var(ENV_CLEANUP_INTERVAL_SECS, "0");
        assert!(matches!(
            CacheConfig::from_env(),
            Err(CacheError::ConfigError(_))
        ));

        std::env::set_var(ENV_CLEANUP_INTERVAL_SECS, "30");
        let config = CacheConfig::from_env().unwrap();
        assert!(config.enable_auto_cleanup);
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));

        for name in [
            ENV_TTL_SECS,
            ENV_TIER1_MAX_ENTRIES,
            ENV_TIER2_MAX_ENTRIES,
            ENV_SWEEP_EVERY,
            ENV_CLEANUP_INTERVAL_SECS,
        ] {
            std::env::remove_var(name);
        }
    }
}
