//! Throttled logging of unauthorized access attempts
//!
//! Unauthorized callers never get a reply. Each attempt is still recorded,
//! but only the first attempt from a user within the cooldown window gets a
//! log line; the rest are counted and summarized every 100 attempts.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Tracks users that were recently logged as unauthorized
#[derive(Clone)]
pub struct UnauthorizedCache {
    /// user_id -> () with TTL equal to the cooldown
    cache: Cache<i64, ()>,
    cooldown: Duration,
    silenced_count: Arc<AtomicU64>,
}

impl UnauthorizedCache {
    /// Creates a new `UnauthorizedCache`
    ///
    /// # Examples
    ///
    /// ```
    /// use umida_bot::bot::UnauthorizedCache;
    ///
    /// let cache = UnauthorizedCache::new(
    ///     1200,   // 20 minutes between log lines per user
    ///     10_000  // max 10k entries
    /// );
    /// assert_eq!(cache.cooldown().as_secs(), 1200);
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, max_capacity: u64) -> Self {
        let cooldown = Duration::from_secs(cooldown_secs);
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(cooldown)
            .build();

        Self {
            cache,
            cooldown,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records one unauthorized attempt.
    ///
    /// Returns `true` if the attempt was logged, `false` if it fell inside the
    /// user's cooldown and was only counted. Only the caller id is logged,
    /// never the message content.
    pub async fn record(&self, user_id: i64) -> bool {
        if self.cache.get(&user_id).await.is_none() {
            self.cache.insert(user_id, ()).await;
            debug!(user_id, "⛔️ Ignoring message from unauthorized user");
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!(
                "⛔️ Silenced {} unauthorized attempts (recent: user {})",
                count, user_id
            );
        }

        false
    }

    /// Returns the current number of entries in the cache
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Returns the total number of attempts that were counted but not logged
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }

    /// Returns the configured cooldown duration
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
