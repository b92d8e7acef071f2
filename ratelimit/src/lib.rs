mod bucket;

use error::SyncError;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bucket::TokenBucket;

/// Per-host token bucket configuration, as loaded from `domainRateLimits` in
/// the app config.
#[derive(Debug, Clone, Deserialize)]
pub struct HostLimit {
    pub capacity: f64,
    #[serde(rename = "refillRate")]
    pub refill_rate: f64,
    #[serde(rename = "initialTokens")]
    pub initial_tokens: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct BucketStatus {
    pub capacity: f64,
    pub current_tokens: f64,
    pub refill_rate: f64,
    pub waiting: usize,
}

/// Per-host rate limiter. Hosts not present in `limits` are unrestricted:
/// `acquire` returns immediately.
pub struct RateLimiter {
    limits: HashMap<String, HostLimit>,
    buckets: RwLock<HashMap<String, TokenBucket>>,
    shutdown: CancellationToken,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, HostLimit>) -> Self {
        RateLimiter::with_shutdown(limits, CancellationToken::new())
    }

    /// Like [`RateLimiter::new`], but every host bucket's refill ticker
    /// exits as soon as `shutdown` fires instead of running until the
    /// process exits.
    pub fn with_shutdown(limits: HashMap<String, HostLimit>, shutdown: CancellationToken) -> Self {
        RateLimiter {
            limits,
            buckets: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Extracts the host from `url` and attempts to debit `tokens` from its
    /// bucket, waiting (continuous refill) until either enough tokens
    /// accumulate or `timeout` elapses. Hosts with no configured limit are
    /// never throttled.
    pub async fn acquire(
        &self,
        url: &str,
        tokens: f64,
        timeout: Option<Duration>,
    ) -> Result<(), SyncError> {
        let host = util::host_of(url);
        let Some(limit) = self.limits.get(&host) else {
            return Ok(());
        };

        if !self.buckets.read().contains_key(&host) {
            let mut write = self.buckets.write();
            write.entry(host.clone()).or_insert_with(|| {
                TokenBucket::new(limit.capacity, limit.refill_rate, limit.initial_tokens, self.shutdown.clone())
            });
        }

        let bucket = {
            let read = self.buckets.read();
            read.get(&host).expect("bucket inserted above").clone_handle()
        };

        debug!(host = %host, tokens, "acquiring rate-limit tokens");
        bucket
            .acquire(tokens, timeout)
            .await
            .map_err(|_| SyncError::RateLimitTimeout { host: host.clone() })
    }

    pub fn status(&self, host: &str) -> Option<BucketStatus> {
        let limit = self.limits.get(host)?;
        let bucket = self.buckets.read().get(host).map(|b| b.clone_handle());
        match bucket {
            Some(b) => Some(b.status()),
            None => Some(BucketStatus {
                capacity: limit.capacity,
                current_tokens: limit.initial_tokens.unwrap_or(limit.capacity),
                refill_rate: limit.refill_rate,
                waiting: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn limiter() -> RateLimiter {
        let mut limits = HashMap::new();
        limits.insert(
            "api.modrinth.com".to_string(),
            HostLimit {
                capacity: 10.0,
                refill_rate: 1.0,
                initial_tokens: Some(10.0),
            },
        );
        RateLimiter::new(limits)
    }

    #[tokio::test]
    async fn unconfigured_host_never_blocks() {
        let limiter = limiter();
        for _ in 0..100 {
            limiter
                .acquire("https://unconfigured.example.com/x", 1.0, None)
                .await
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn saturation_spaces_out_waiters() {
        let limiter = Arc::new(limiter());
        let start = Instant::now();

        let mut handles = vec![];
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .acquire(
                        "https://api.modrinth.com/v2/project",
                        1.0,
                        Some(Duration::from_secs(15)),
                    )
                    .await
            }));
        }

        for h in handles {
            h.await.unwrap().unwrap();
        }

        // first 10 are immediate, the rest trickle in at ~1/s: total should
        // take at least ~9s (10 extra tokens at 1/s after the initial burst).
        assert!(start.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test]
    async fn timeout_yields_rate_limit_timeout() {
        let mut limits = HashMap::new();
        limits.insert(
            "slow.example.com".to_string(),
            HostLimit {
                capacity: 1.0,
                refill_rate: 0.01,
                initial_tokens: Some(0.0),
            },
        );
        let limiter = RateLimiter::new(limits);
        let result = limiter
            .acquire("https://slow.example.com/x", 1.0, Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(SyncError::RateLimitTimeout { .. })));
    }
}
