use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use common::{Balances, Candle, Error, ExchangeClient, Fill, Order, OrderDetails, Pair, Result};

/// Token-bucket parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket size, and the number of calls allowed back to back.
    pub capacity: f64,
    /// Tokens regained per second, continuously.
    pub refill_per_sec: f64,
    /// How often a blocked caller re-checks the bucket.
    pub poll_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 15.0,
            refill_per_sec: 0.33,
            poll_interval_ms: 1_000,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.capacity >= 1.0) || !(self.refill_per_sec > 0.0) || self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "rate_limit needs capacity >= 1, refill_per_sec > 0 and a non-zero poll interval"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Process-wide call budget for one exchange connection.
///
/// Tokens never go negative: a caller that finds less than one token sleeps
/// in `poll_interval_ms` steps until one has accrued.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Starts with a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        let bucket = Bucket {
            tokens: config.capacity,
            last_refill: Instant::now(),
        };
        Self {
            config,
            bucket: Mutex::new(bucket),
        }
    }

    /// Wait until a token is available, then spend it.
    pub async fn acquire(&self) {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                debug!(tokens = bucket.tokens, "Rate limit reached, waiting for refill");
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Tokens currently in the bucket, after refilling.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.refill_per_sec).min(self.config.capacity);
        bucket.last_refill = now;
    }
}

/// `ExchangeClient` decorator that spends one token before every call,
/// public or private.
pub struct RateLimitedClient {
    inner: Arc<dyn ExchangeClient>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn ExchangeClient>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl ExchangeClient for RateLimitedClient {
    async fn fetch_candles(&self, pair: &Pair, interval_minutes: u32) -> Result<Vec<Candle>> {
        self.limiter.acquire().await;
        self.inner.fetch_candles(pair, interval_minutes).await
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        self.limiter.acquire().await;
        self.inner.fetch_balance().await
    }

    async fn place_order(&self, order: &Order) -> Result<Fill> {
        self.limiter.acquire().await;
        self.inner.place_order(order).await
    }

    async fn fetch_order(&self, id: &str, pair: &Pair) -> Result<OrderDetails> {
        self.limiter.acquire().await;
        self.inner.fetch_order(id, pair).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn sixteenth_call_waits_at_least_three_seconds() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let start = Instant::now();
        for _ in 0..15 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10), "burst should not block");

        limiter.acquire().await;
        assert!(
            start.elapsed() >= Duration::from_secs(3),
            "16th call proceeded after {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_never_exceed_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!((limiter.available().await - 15.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_continuous() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..15 {
            limiter.acquire().await;
        }
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let tokens = limiter.available().await;
        assert!((tokens - 0.495).abs() < 1e-6, "got {tokens}");
    }

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeClient for CountingClient {
        async fn fetch_candles(&self, _: &Pair, _: u32) -> Result<Vec<Candle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        async fn fetch_balance(&self) -> Result<Balances> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Balances::new())
        }
        async fn place_order(&self, _: &Order) -> Result<Fill> {
            Err(Error::Exchange("not in this test".into()))
        }
        async fn fetch_order(&self, _: &str, _: &Pair) -> Result<OrderDetails> {
            Err(Error::Exchange("not in this test".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn decorator_spends_a_token_per_call() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let inner = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
        });
        let client = RateLimitedClient::new(inner.clone(), limiter.clone());
        let pair = Pair::new("ETH", "EUR");

        client.fetch_candles(&pair, 5).await.unwrap();
        client.fetch_balance().await.unwrap();
        let _ = client.place_order(&Order::market(pair.clone(), common::OrderSide::Buy, 1.0)).await;

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        let left = limiter.available().await;
        assert!((left - 12.0).abs() < 1e-6, "got {left}");
    }
}
