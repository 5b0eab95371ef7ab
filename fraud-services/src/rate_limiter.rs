//! Request pacing for search providers
//!
//! A research run resolves topics one after another, but several runs can
//! share one provider account. [`RateLimiter`] spaces requests out across
//! all of them and [`RateLimitedSearch`] applies it to any
//! [`SearchProvider`].

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use fraud_core::FraudError;
use fraud_research::{SearchHit, SearchProvider};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Exa allows 5 requests per second; stay under it
pub const EXA_MIN_REQUEST_INTERVAL_MS: u64 = 250;

/// Firecrawl free and hobby plans allow roughly one search per second
pub const FIRECRAWL_MIN_REQUEST_INTERVAL_MS: u64 = 1000;

/// Enforces a minimum delay between requests
///
/// Callers reserve the next free slot while holding the lock and sleep
/// after releasing it, so concurrent callers always get distinct slots.
#[derive(Debug)]
pub struct RateLimiter {
    /// Next free slot, in milliseconds since `epoch`
    next_available_ms: Mutex<u64>,
    epoch: Instant,
    min_interval: Duration,
    name: String,
    total_requests: AtomicU64,
    waited_requests: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval_ms: u64, name: &str) -> Self {
        Self {
            next_available_ms: Mutex::new(0),
            epoch: Instant::now(),
            min_interval: Duration::from_millis(min_interval_ms),
            name: name.to_string(),
            total_requests: AtomicU64::new(0),
            waited_requests: AtomicU64::new(0),
        }
    }

    pub fn for_exa() -> Arc<Self> {
        Arc::new(Self::new(EXA_MIN_REQUEST_INTERVAL_MS, "exa"))
    }

    pub fn for_firecrawl() -> Arc<Self> {
        Arc::new(Self::new(FIRECRAWL_MIN_REQUEST_INTERVAL_MS, "firecrawl"))
    }

    fn elapsed_ms(&self, instant: Instant) -> u64 {
        instant.duration_since(self.epoch).as_millis() as u64
    }

    /// Wait until the caller's reserved slot comes up
    pub async fn acquire(&self) {
        let request_num = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;
        let now_ms = self.elapsed_ms(Instant::now());
        let interval_ms = self.min_interval.as_millis() as u64;

        let slot_ms = {
            let mut next_available = self.next_available_ms.lock().await;
            let slot = (*next_available).max(now_ms);
            *next_available = slot + interval_ms;
            slot
        };

        if slot_ms > now_ms {
            self.waited_requests.fetch_add(1, Ordering::Relaxed);
            let target = self.epoch + Duration::from_millis(slot_ms);
            debug!(
                limiter = %self.name,
                request = request_num,
                wait_ms = slot_ms - now_ms,
                "Request queued"
            );
            tokio::time::sleep_until(target).await;
        }
    }

    /// True if a request made now would not wait
    pub async fn can_acquire_immediately(&self) -> bool {
        let now_ms = self.elapsed_ms(Instant::now());
        now_ms >= *self.next_available_ms.lock().await
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            waited_requests: self.waited_requests.load(Ordering::Relaxed),
            min_interval_ms: self.min_interval.as_millis() as u64,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub waited_requests: u64,
    pub min_interval_ms: u64,
    pub name: String,
}

/// A search provider paced by a shared [`RateLimiter`]
pub struct RateLimitedSearch<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> RateLimitedSearch<S> {
    pub fn new(inner: S, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<S: SearchProvider> SearchProvider for RateLimitedSearch<S> {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, FraudError> {
        self.limiter.acquire().await;
        self.inner.search(query, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_immediate() {
        let limiter = RateLimiter::new(100, "test");

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_waits_one_interval() {
        let limiter = RateLimiter::new(100, "test");

        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_can_acquire_after_interval() {
        let limiter = RateLimiter::new(100, "test");
        assert!(limiter.can_acquire_immediately().await);

        limiter.acquire().await;
        assert!(!limiter.can_acquire_immediately().await);

        tokio::time::advance(Duration::from_millis(110)).await;
        assert!(limiter.can_acquire_immediately().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_get_distinct_slots() {
        let limiter = Arc::new(RateLimiter::new(50, "concurrent"));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(50));
        }
        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.waited_requests, 4);
    }

    struct CountingSearch(AtomicU64);

    #[async_trait]
    impl SearchProvider for CountingSearch {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, FraudError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SearchHit {
                url: format!("https://example.gov/{}", query),
                title: None,
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_search_paces_calls() {
        let search = RateLimitedSearch::new(
            CountingSearch(AtomicU64::new(0)),
            Arc::new(RateLimiter::new(250, "test")),
        );

        let start = Instant::now();
        for query in ["a", "b", "c"] {
            let hits = search.search(query, 5).await.unwrap();
            assert_eq!(hits.len(), 1);
        }
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(search.inner.0.load(Ordering::SeqCst), 3);
    }
}
