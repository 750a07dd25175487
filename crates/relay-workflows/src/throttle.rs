//! Oracle evaluation throttle with TTL and LRU eviction
//!
//! Each (workflow, lineage) pair may consult the oracle a bounded number of
//! times, with a cooldown between consultations. Entries idle longer than
//! the TTL are forgotten; the least recently used ones go first when the
//! cache is full.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Time source, injectable so tests can move time by hand
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Verdict for one consultation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed,
    LimitReached,
    CoolingDown,
}

#[derive(Debug, Clone)]
struct Consultations {
    count: u32,
    last_at: Instant,
}

/// Throttle settings
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub max_consultations: u32,
    pub cooldown: Duration,
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_consultations: 2,
            cooldown: Duration::from_secs(2),
            capacity: 1024,
            ttl: Duration::from_secs(3600),
        }
    }
}

type PairKey = (String, String);

pub struct EvaluationThrottle {
    entries: Mutex<LruCache<PairKey, Consultations>>,
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
}

impl EvaluationThrottle {
    pub fn new(config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            config,
            clock,
        }
    }

    /// Decide whether the pair may consult now, recording the
    /// consultation when it may.
    pub async fn check_and_record(&self, workflow_id: &str, lineage: &str) -> ThrottleDecision {
        let now = self.clock.now();
        let key = (workflow_id.to_string(), lineage.to_string());
        let mut entries = self.entries.lock().await;

        let expired = entries
            .peek(&key)
            .map(|e| now.saturating_duration_since(e.last_at) > self.config.ttl)
            .unwrap_or(false);
        if expired {
            entries.pop(&key);
        }

        let decision = match entries.get_mut(&key) {
            None => {
                if self.config.max_consultations == 0 {
                    ThrottleDecision::LimitReached
                } else {
                    entries.put(key, Consultations { count: 1, last_at: now });
                    ThrottleDecision::Allowed
                }
            }
            Some(entry) if entry.count >= self.config.max_consultations => {
                ThrottleDecision::LimitReached
            }
            Some(entry) if now.saturating_duration_since(entry.last_at) < self.config.cooldown => {
                ThrottleDecision::CoolingDown
            }
            Some(entry) => {
                entry.count += 1;
                entry.last_at = now;
                ThrottleDecision::Allowed
            }
        };

        if decision != ThrottleDecision::Allowed {
            debug!(
                "Oracle consultation for {}/{} throttled: {:?}",
                workflow_id, lineage, decision
            );
        }
        decision
    }

    /// Drop every entry belonging to a workflow
    pub async fn forget_workflow(&self, workflow_id: &str) {
        let mut entries = self.entries.lock().await;
        let keys: Vec<PairKey> = entries
            .iter()
            .filter(|((wf, _), _)| wf == workflow_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            entries.pop(&key);
        }
    }

    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max: u32, cooldown_ms: u64, capacity: usize) -> (EvaluationThrottle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = ThrottleConfig {
            max_consultations: max,
            cooldown: Duration::from_millis(cooldown_ms),
            capacity,
            ttl: Duration::from_secs(60),
        };
        (EvaluationThrottle::new(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_limit_and_cooldown() {
        let (throttle, clock) = throttle(2, 1000, 16);

        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::Allowed);
        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::CoolingDown);

        clock.advance(Duration::from_millis(1001));
        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::Allowed);

        clock.advance(Duration::from_millis(5000));
        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::LimitReached);

        // Other pairs are independent
        assert_eq!(throttle.check_and_record("wf", "b").await, ThrottleDecision::Allowed);
    }

    #[tokio::test]
    async fn test_ttl_resets_entry() {
        let (throttle, clock) = throttle(1, 0, 16);
        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::Allowed);
        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::LimitReached);

        clock.advance(Duration::from_secs(61));
        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::Allowed);
    }

    #[tokio::test]
    async fn test_lru_eviction_and_forget() {
        let (throttle, _clock) = throttle(1, 0, 2);
        throttle.check_and_record("wf1", "a").await;
        throttle.check_and_record("wf1", "b").await;
        throttle.check_and_record("wf2", "a").await;
        assert_eq!(throttle.len().await, 2);
        // "wf1/a" was evicted, so it starts a fresh budget
        assert_eq!(throttle.check_and_record("wf1", "a").await, ThrottleDecision::Allowed);

        throttle.forget_workflow("wf1").await;
        assert_eq!(throttle.len().await, 1);
        assert_eq!(throttle.clear().await, 1);
    }

    #[tokio::test]
    async fn test_zero_budget_never_allows() {
        let (throttle, _clock) = throttle(0, 0, 4);
        assert_eq!(throttle.check_and_record("wf", "a").await, ThrottleDecision::LimitReached);
    }
}
