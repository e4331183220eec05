//! Request rate limiting using a token bucket
//!
//! Every chapter owns a [`RateLimiter`] that hands out one permit per outbound
//! page request. Workers wait on it before each fetch, which makes it the primary
//! suspension point controlling the request rate against a provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Tokens are tracked in thousandths of a permit so slow refill rates still accrue
const MILLIS_PER_PERMIT: u64 = 1_000;

/// Lock-free token bucket limiting requests per second
///
/// # Algorithm
///
/// - One token is one outbound request
/// - Tokens refill at `rate` per second, up to `burst`
/// - The bucket starts full, so the first `burst` requests go out immediately
/// - A waiter with no token sleeps until the refill should cover it, re-checking
///   at most every 100ms
///
/// A rate of 0 disables limiting.
#[derive(Clone)]
pub struct RateLimiter {
    /// Permits per second (0 = unlimited)
    rate: u64,
    /// Bucket capacity in milli-permits
    capacity: u64,
    /// Available milli-permits
    tokens: Arc<AtomicU64>,
    /// Last refill, nanoseconds since `origin`
    last_refill: Arc<AtomicU64>,
    origin: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` requests per second with bursts of `burst`
    ///
    /// ```
    /// use chapter_dl::rate_limiter::RateLimiter;
    ///
    /// // 4 page requests per second, up to 4 at once
    /// let limiter = RateLimiter::new(4, 4);
    /// assert_eq!(limiter.rate(), 4);
    /// ```
    #[must_use]
    pub fn new(rate: u64, burst: u64) -> Self {
        let capacity = burst.max(1).saturating_mul(MILLIS_PER_PERMIT);
        Self {
            rate,
            capacity,
            tokens: Arc::new(AtomicU64::new(capacity)),
            last_refill: Arc::new(AtomicU64::new(0)),
            origin: Instant::now(),
        }
    }

    /// Permits per second, 0 when unlimited
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        if self.rate == 0 {
            return true;
        }
        self.refill_tokens();
        self.tokens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                t.checked_sub(MILLIS_PER_PERMIT)
            })
            .is_ok()
    }

    /// Wait until a permit is available
    ///
    /// Returns [`Error::Cancelled`] as soon as `cancel` fires, whether or not a
    /// permit was free.
    pub async fn until_ready(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.try_acquire() {
                return Ok(());
            }

            let deficit = MILLIS_PER_PERMIT.saturating_sub(self.tokens.load(Ordering::SeqCst));
            // milli-permits / (rate * 1000 milli-permits per second) in ms
            let wait_ms = deficit / self.rate.max(1);

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(wait_ms.clamp(1, 100))) => {}
            }
        }
    }

    fn refill_tokens(&self) {
        let now = self.now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);
        let elapsed_nanos = now.saturating_sub(last);

        // rate * 1000 milli-permits per 1e9 ns
        let to_add = (u128::from(self.rate) * u128::from(elapsed_nanos) / 1_000_000) as u64;
        if to_add == 0 {
            return;
        }

        if self
            .last_refill
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let capacity = self.capacity;
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                    Some(t.saturating_add(to_add).min(capacity))
                });
        }
    }

    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("burst", &(self.capacity / MILLIS_PER_PERMIT))
            .field("tokens", &self.tokens.load(Ordering::Relaxed))
            .finish()
    }
}
