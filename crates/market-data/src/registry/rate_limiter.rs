//! Request spacing and backoff for source providers.
//!
//! Every endpoint key remembers when its last request was issued. A caller
//! asking for a permit reserves the next free slot (`last + spacing`) under
//! the lock and then sleeps until that slot outside the lock, so concurrent
//! callers queue up in arrival order without holding the mutex while asleep.
//! A slot that would only fire after the caller's deadline is never reserved.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

/// Spacing used for keys nobody configured.
const DEFAULT_SPACING: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct EndpointSlot {
    /// When the most recently granted permit fires.
    last_issued: Option<Instant>,
    spacing: Duration,
}

impl EndpointSlot {
    fn new(spacing: Duration) -> Self {
        Self {
            last_issued: None,
            spacing,
        }
    }

    fn next_slot(&self, now: Instant) -> Instant {
        match self.last_issued {
            Some(last) => (last + self.spacing).max(now),
            None => now,
        }
    }

    /// Reserves the next slot and returns it.
    fn reserve(&mut self, now: Instant) -> Instant {
        let slot = self.next_slot(now);
        self.last_issued = Some(slot);
        slot
    }
}

/// Per-endpoint minimum-spacing rate limiter.
///
/// Thread-safe; slots are created on demand with the default spacing, or can
/// be pre-configured per key.
pub struct RateLimiter {
    slots: Mutex<HashMap<String, EndpointSlot>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the slots mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly early request.
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, EndpointSlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Sets the minimum spacing for a key. The last-issued timestamp is kept.
    pub fn configure(&self, key: &str, spacing: Duration) {
        let mut slots = self.lock_slots();
        slots
            .entry(key.to_string())
            .and_modify(|s| s.spacing = spacing)
            .or_insert_with(|| EndpointSlot::new(spacing));
    }

    pub fn spacing(&self, key: &str) -> Duration {
        self.lock_slots()
            .get(key)
            .map(|s| s.spacing)
            .unwrap_or(DEFAULT_SPACING)
    }

    /// Reserves the key's next slot and sleeps until it, provided the slot
    /// fires before `deadline`. Otherwise nothing is reserved and `false` is
    /// returned right away.
    pub async fn acquire_before(&self, key: &str, deadline: Instant) -> bool {
        let slot = {
            let mut slots = self.lock_slots();
            let entry = slots
                .entry(key.to_string())
                .or_insert_with(|| EndpointSlot::new(DEFAULT_SPACING));
            let now = Instant::now();
            if entry.next_slot(now) >= deadline {
                debug!("Rate limiter: no permit for '{}' before the deadline", key);
                return false;
            }
            entry.reserve(now)
        };

        let now = Instant::now();
        if slot > now {
            debug!("Rate limiter: waiting {:?} for '{}'", slot - now, key);
            tokio::time::sleep_until(slot).await;
        }
        true
    }
}

/// Exponential backoff applied after a rate-limit signal.
///
/// `delay(attempt) = base_delay * 2^attempt`. Once `max_attempts` retries have
/// been spent on one provider within one call, the caller gives up on it.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        // 2^16 already dwarfs any sane base delay
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Whether another retry is allowed after `attempts_spent` retries.
    pub fn allows_retry(&self, attempts_spent: u32) -> bool {
        attempts_spent < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn acquire(limiter: &RateLimiter, key: &str) {
        let far = Instant::now() + Duration::from_secs(3600);
        assert!(limiter.acquire_before(key, far).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_permit_is_immediate() {
        let limiter = RateLimiter::new();
        limiter.configure("ALPHA_VANTAGE", Duration::from_secs(12));

        let start = Instant::now();
        acquire(&limiter, "ALPHA_VANTAGE").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_permit_waits_for_spacing() {
        let limiter = RateLimiter::new();
        limiter.configure("ALPHA_VANTAGE", Duration::from_secs(12));

        let start = Instant::now();
        acquire(&limiter, "ALPHA_VANTAGE").await;
        acquire(&limiter, "ALPHA_VANTAGE").await;
        acquire(&limiter, "ALPHA_VANTAGE").await;
        assert_eq!(start.elapsed(), Duration::from_secs(24));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        limiter.configure("ALPHA_VANTAGE", Duration::from_secs(12));
        limiter.configure("YAHOO", Duration::from_secs(2));

        let start = Instant::now();
        acquire(&limiter, "ALPHA_VANTAGE").await;
        acquire(&limiter, "YAHOO").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = std::sync::Arc::new(RateLimiter::new());
        limiter.configure("YAHOO", Duration::from_secs(2));

        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    acquire(&limiter, "YAHOO").await;
                    Instant::now()
                })
            })
            .collect();

        let mut fired = Vec::new();
        for h in handles {
            fired.push(h.await.unwrap() - start);
        }
        fired.sort();
        assert_eq!(
            fired,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_before_refuses_late_slot() {
        let limiter = RateLimiter::new();
        limiter.configure("ALPHA_VANTAGE", Duration::from_secs(12));

        let start = Instant::now();
        let deadline = start + Duration::from_secs(20);
        assert!(limiter.acquire_before("ALPHA_VANTAGE", deadline).await);
        assert!(limiter.acquire_before("ALPHA_VANTAGE", deadline).await);
        assert_eq!(start.elapsed(), Duration::from_secs(12));

        // Next slot is at 24s, past the deadline: refused without waiting
        assert!(!limiter.acquire_before("ALPHA_VANTAGE", deadline).await);
        assert_eq!(start.elapsed(), Duration::from_secs(12));

        // The refusal reserved nothing, so a plain caller still gets 24s
        acquire(&limiter, "ALPHA_VANTAGE").await;
        assert_eq!(start.elapsed(), Duration::from_secs(24));
    }

    #[test]
    fn test_unknown_key_uses_default_spacing() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.spacing("NOPE"), DEFAULT_SPACING);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 3);
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(1), Duration::from_secs(4));
        assert_eq!(policy.delay(2), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_retry_cap() {
        let policy = BackoffPolicy::default();
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }
}
