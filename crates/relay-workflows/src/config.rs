//! Engine tunables

use relay_core::config::get_config_int;
use std::time::Duration;

/// Configuration for the execution engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Oracle consultations allowed per (workflow, lineage) pair
    pub max_oracle_consultations: u32,
    /// Steps the oracle may insert into one workflow, over its lifetime
    pub max_inserted_steps: usize,
    /// Minimum gap between consultations for the same pair
    pub oracle_cooldown: Duration,
    /// Upper bound on a single oracle call
    pub oracle_timeout: Duration,
    /// Entries kept by the evaluation throttle before LRU eviction
    pub eval_cache_capacity: usize,
    /// Idle time after which a throttle entry is forgotten
    pub eval_cache_ttl: Duration,
    /// Strings longer than this are elided in oracle input and logs
    pub elide_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_oracle_consultations: 2,
            max_inserted_steps: 16,
            oracle_cooldown: Duration::from_millis(2_000),
            oracle_timeout: Duration::from_millis(15_000),
            eval_cache_capacity: 1024,
            eval_cache_ttl: Duration::from_secs(3600),
            elide_threshold: 2048,
        }
    }
}

fn non_negative(key: &str, default: u64) -> u64 {
    get_config_int(key, default as i64).max(0) as u64
}

impl EngineConfig {
    /// Build from `RELAY_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_oracle_consultations: non_negative(
                "RELAY_ORACLE_MAX_CONSULTATIONS",
                d.max_oracle_consultations as u64,
            )
            .min(u32::MAX as u64) as u32,
            max_inserted_steps: non_negative(
                "RELAY_ORACLE_MAX_INSERTIONS",
                d.max_inserted_steps as u64,
            ) as usize,
            oracle_cooldown: Duration::from_millis(non_negative(
                "RELAY_ORACLE_COOLDOWN_MS",
                d.oracle_cooldown.as_millis() as u64,
            )),
            oracle_timeout: Duration::from_millis(
                non_negative("RELAY_ORACLE_TIMEOUT_MS", d.oracle_timeout.as_millis() as u64)
                    .max(1),
            ),
            eval_cache_capacity: non_negative(
                "RELAY_EVAL_CACHE_CAPACITY",
                d.eval_cache_capacity as u64,
            )
            .max(1) as usize,
            eval_cache_ttl: Duration::from_secs(non_negative(
                "RELAY_EVAL_CACHE_TTL_SECS",
                d.eval_cache_ttl.as_secs(),
            )),
            elide_threshold: non_negative("RELAY_ELIDE_THRESHOLD", d.elide_threshold as u64)
                .max(64) as usize,
        }
    }

    pub fn with_max_oracle_consultations(mut self, max: u32) -> Self {
        self.max_oracle_consultations = max;
        self
    }

    pub fn with_max_inserted_steps(mut self, max: usize) -> Self {
        self.max_inserted_steps = max;
        self
    }

    pub fn with_oracle_cooldown(mut self, cooldown: Duration) -> Self {
        self.oracle_cooldown = cooldown;
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn with_elide_threshold(mut self, threshold: usize) -> Self {
        self.elide_threshold = threshold;
        self
    }
}
