//! Fixed-window rate limiting with a shared store and a local fallback.
//!
//! # Data Flow
//! ```text
//! check(identifier, limit)
//!     → shared store (GET record, SET record EX ttl)   [when configured]
//!     → on timeout / error / no store: local.rs (per-instance map)
//!     → RateDecision { allowed, remaining, reset_at }
//! ```
//!
//! # Design Decisions
//! - Both paths run the same window arithmetic (`advance_window`)
//! - The shared path is read-then-write, not atomic: concurrent requests
//!   on one key can overshoot the limit slightly
//! - Store failures are never surfaced to callers; they are logged and
//!   counted as degraded-mode events
//! - No retries inside the limiter; a slow store is a failed store

pub mod local;
pub mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::security::clock::Clock;

pub use local::LocalWindowStore;
pub use store::{RedisStore, SharedStore, StoreUnavailable};

/// Namespace for window records in both stores.
pub const KEY_PREFIX: &str = "rate_limit:";

/// Request classes with independent limits and key namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    List,
    Login,
    Upload,
    Delete,
    ObjectFetch,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::List => "list",
            OperationClass::Login => "login",
            OperationClass::Upload => "upload",
            OperationClass::Delete => "delete",
            OperationClass::ObjectFetch => "object",
        }
    }

    /// Rate-limit identifier for a caller within this class.
    pub fn identifier(&self, client: &str) -> String {
        format!("{}:{}", self.as_str(), client)
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limit for one operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl WindowLimit {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends.
    pub reset_at: u64,
}

impl RateDecision {
    /// Whole seconds until the window resets, at least one.
    pub fn retry_after_secs(&self, now_millis: u64) -> u64 {
        ttl_secs(self.reset_at.saturating_sub(now_millis))
    }
}

/// Persisted state of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRecord {
    pub count: u32,
    pub reset_at: u64,
}

/// Apply one request to the current record of a key.
///
/// A missing or elapsed record starts a new window; otherwise the count is
/// incremented within the existing window.
pub fn advance_window(
    current: Option<WindowRecord>,
    limit: WindowLimit,
    now: u64,
) -> (WindowRecord, RateDecision) {
    match current {
        Some(record) if record.reset_at > now => {
            let count = record.count.saturating_add(1);
            let next = WindowRecord {
                count,
                reset_at: record.reset_at,
            };
            let decision = if count > limit.max_requests {
                RateDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: record.reset_at,
                }
            } else {
                RateDecision {
                    allowed: true,
                    remaining: limit.max_requests - count,
                    reset_at: record.reset_at,
                }
            };
            (next, decision)
        }
        _ => {
            let reset_at = now.saturating_add(limit.window_ms);
            let next = WindowRecord { count: 1, reset_at };
            let decision = RateDecision {
                allowed: true,
                remaining: limit.max_requests.saturating_sub(1),
                reset_at,
            };
            (next, decision)
        }
    }
}

/// Milliseconds rounded up to whole seconds, never zero.
fn ttl_secs(millis: u64) -> u64 {
    millis.div_ceil(1000).max(1)
}

/// Per-identifier fixed-window limiter.
pub struct RateLimiter {
    shared: Option<Arc<dyn SharedStore>>,
    local: LocalWindowStore,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(
        shared: Option<Arc<dyn SharedStore>>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        if shared.is_none() {
            tracing::warn!("No shared rate-limit store configured; limits are enforced per instance");
        }
        Self {
            shared,
            local: LocalWindowStore::new(),
            clock,
            store_timeout,
        }
    }

    /// Limiter that only ever counts in process memory.
    pub fn local_only(clock: Arc<dyn Clock>) -> Self {
        Self::new(None, clock, Duration::from_millis(0))
    }

    /// The shared store, if one is configured.
    pub fn shared_store(&self) -> Option<&Arc<dyn SharedStore>> {
        self.shared.as_ref()
    }

    /// The fallback store.
    pub fn local_store(&self) -> &LocalWindowStore {
        &self.local
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Count a request for `identifier` and decide whether it may proceed.
    pub async fn check(&self, identifier: &str, limit: WindowLimit) -> RateDecision {
        let key = format!("{KEY_PREFIX}{identifier}");
        let now = self.clock.now_millis();

        if let Some(store) = &self.shared {
            match self.check_shared(store.as_ref(), &key, limit, now).await {
                Ok(decision) => return decision,
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Shared rate-limit store unavailable, counting locally"
                    );
                    metrics::record_rate_limit_degraded();
                }
            }
        }

        self.local.check(&key, limit, now)
    }

    async fn check_shared(
        &self,
        store: &dyn SharedStore,
        key: &str,
        limit: WindowLimit,
        now: u64,
    ) -> Result<RateDecision, StoreUnavailable> {
        let raw = tokio::time::timeout(self.store_timeout, store.get(key))
            .await
            .map_err(|_| StoreUnavailable::timed_out(self.store_timeout))??;

        // An unreadable record is treated like no record at all.
        let current = raw.and_then(|value| serde_json::from_str::<WindowRecord>(&value).ok());
        let (record, decision) = advance_window(current, limit, now);

        let value = serde_json::to_string(&record)
            .map_err(|e| StoreUnavailable(format!("failed to encode window: {e}")))?;
        let ttl = ttl_secs(record.reset_at.saturating_sub(now));

        tokio::time::timeout(self.store_timeout, store.put(key, value, ttl))
            .await
            .map_err(|_| StoreUnavailable::timed_out(self.store_timeout))??;

        Ok(decision)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::security::clock::ManualClock;

    const LIMIT: WindowLimit = WindowLimit::new(5, 60_000);
    const START: u64 = 1_700_000_000_000;

    fn shared_limiter(clock: &ManualClock) -> (RateLimiter, Arc<MemorySharedStore>) {
        let store = Arc::new(MemorySharedStore::new(Arc::new(clock.clone())));
        let limiter = RateLimiter::new(
            Some(store.clone()),
            Arc::new(clock.clone()),
            Duration::from_millis(100),
        );
        (limiter, store)
    }

    async fn run_sequence(limiter: &RateLimiter, id: &str, n: usize) -> Vec<(bool, u32)> {
        let mut out = Vec::new();
        for _ in 0..n {
            let d = limiter.check(id, LIMIT).await;
            out.push((d.allowed, d.remaining));
        }
        out
    }

    #[test]
    fn test_advance_window_new_and_elapsed() {
        let (record, decision) = advance_window(None, LIMIT, 1_000);
        assert_eq!(record, WindowRecord { count: 1, reset_at: 61_000 });
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);

        let stale = WindowRecord { count: 99, reset_at: 1_000 };
        let (record, decision) = advance_window(Some(stale), LIMIT, 1_000);
        assert_eq!(record.count, 1);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_advance_window_keeps_reset_time() {
        let live = WindowRecord { count: 2, reset_at: 50_000 };
        let (record, decision) = advance_window(Some(live), LIMIT, 10_000);
        assert_eq!(record, WindowRecord { count: 3, reset_at: 50_000 });
        assert_eq!(decision.reset_at, 50_000);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateDecision { allowed: false, remaining: 0, reset_at: 10_001 };
        assert_eq!(decision.retry_after_secs(9_000), 2);
        assert_eq!(decision.retry_after_secs(20_000), 1);
    }

    #[tokio::test]
    async fn test_shared_store_enforces_limit() {
        let clock = ManualClock::new(START);
        let (limiter, _) = shared_limiter(&clock);

        let seen = run_sequence(&limiter, "login:ip1", 6).await;
        assert_eq!(
            seen,
            vec![(true, 4), (true, 3), (true, 2), (true, 1), (true, 0), (false, 0)]
        );
        assert!(limiter.local_store().is_empty());
    }

    #[tokio::test]
    async fn test_window_resets_after_elapsed() {
        let clock = ManualClock::new(START);
        let (limiter, _) = shared_limiter(&clock);

        run_sequence(&limiter, "list:ip1", 6).await;
        clock.advance_millis(LIMIT.window_ms);

        let decision = limiter.check("list:ip1", LIMIT).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, LIMIT.max_requests - 1);
        assert_eq!(decision.reset_at, START + 2 * LIMIT.window_ms);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let clock = ManualClock::new(START);
        let (limiter, _) = shared_limiter(&clock);

        run_sequence(&limiter, "login:ip1", 6).await;
        assert!(limiter.check("login:ip2", LIMIT).await.allowed);
        assert!(limiter.check("upload:ip1", LIMIT).await.allowed);
    }

    #[tokio::test]
    async fn test_shared_record_format_and_ttl() {
        let clock = ManualClock::new(START);
        let (limiter, store) = shared_limiter(&clock);

        limiter.check("upload:ip9", LIMIT).await;
        let (value, expires_at) = store.raw("rate_limit:upload:ip9").unwrap();
        let record: WindowRecord = serde_json::from_str(&value).unwrap();
        assert_eq!(record, WindowRecord { count: 1, reset_at: START + 60_000 });
        assert_eq!(expires_at, START + 60_000);

        clock.advance_millis(45_500);
        limiter.check("upload:ip9", LIMIT).await;
        let (_, expires_at) = store.raw("rate_limit:upload:ip9").unwrap();
        // 14.5s left in the window, rounded up to 15s of store TTL.
        assert_eq!(expires_at, START + 45_500 + 15_000);
    }

    #[tokio::test]
    async fn test_corrupt_shared_record_starts_new_window() {
        let clock = ManualClock::new(START);
        let (limiter, store) = shared_limiter(&clock);
        store.insert_raw("rate_limit:list:ip1", "{not json", START + 60_000);

        let decision = limiter.check("list:ip1", LIMIT).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_failing_store_falls_back_with_same_sequence() {
        let clock = ManualClock::new(START);
        let (healthy, _) = shared_limiter(&clock);
        let degraded = RateLimiter::new(
            Some(Arc::new(FailingStore)),
            Arc::new(clock.clone()),
            Duration::from_millis(100),
        );

        let expected = run_sequence(&healthy, "ip1", 7).await;
        let seen = run_sequence(&degraded, "ip1", 7).await;
        assert_eq!(seen, expected);
        assert_eq!(degraded.local_store().len(), 1);
    }

    #[tokio::test]
    async fn test_hanging_store_times_out_to_fallback() {
        let clock = ManualClock::new(START);
        let limiter = RateLimiter::new(
            Some(Arc::new(HangingStore)),
            Arc::new(clock.clone()),
            Duration::from_millis(20),
        );

        let decision = limiter.check("ip1", LIMIT).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(limiter.local_store().len(), 1);
    }

    #[tokio::test]
    async fn test_local_only_limiter() {
        let clock = ManualClock::new(START);
        let limiter = RateLimiter::local_only(Arc::new(clock.clone()));

        let seen = run_sequence(&limiter, "delete:ip1", 6).await;
        assert_eq!(seen.last(), Some(&(false, 0)));

        clock.advance_millis(LIMIT.window_ms + 1);
        assert!(limiter.check("delete:ip1", LIMIT).await.allowed);
    }

    #[test]
    fn test_operation_class_identifiers() {
        assert_eq!(OperationClass::Login.identifier("1.2.3.4"), "login:1.2.3.4");
        assert_eq!(OperationClass::ObjectFetch.to_string(), "object");
    }
}
