use crate::BucketStatus;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Inner {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Inner {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// A single host's token bucket. Continuous-time refill: tokens accrue as
/// `elapsed * refill_rate` each time the bucket is touched, clamped to
/// `capacity`. `Clone` is cheap (an `Arc` handle) so every caller shares the
/// same bucket state.
#[derive(Clone)]
pub struct TokenBucket {
    state: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    waiting: Arc<AtomicUsize>,
}

impl TokenBucket {
    pub fn new(
        capacity: f64,
        refill_rate: f64,
        initial_tokens: Option<f64>,
        shutdown: CancellationToken,
    ) -> Self {
        let bucket = TokenBucket {
            state: Arc::new(Mutex::new(Inner {
                capacity,
                refill_rate,
                tokens: initial_tokens.unwrap_or(capacity),
                last_refill: Instant::now(),
            })),
            notify: Arc::new(Notify::new()),
            waiting: Arc::new(AtomicUsize::new(0)),
        };
        bucket.spawn_refill_ticker(refill_rate, shutdown);
        bucket
    }

    pub fn clone_handle(&self) -> Self {
        self.clone()
    }

    /// Waits (FIFO among callers blocked on this bucket) until `tokens` are
    /// available or `timeout` elapses.
    pub async fn acquire(&self, tokens: f64, timeout: Option<Duration>) -> Result<(), ()> {
        {
            let mut inner = self.state.lock();
            inner.refill();
            if inner.tokens >= tokens {
                inner.tokens -= tokens;
                return Ok(());
            }
        }

        self.waiting.fetch_add(1, Ordering::SeqCst);
        let deadline = timeout.map(|d| Instant::now() + d);
        let result = loop {
            let notified = self.notify.notified();
            let wait = match deadline {
                None => {
                    notified.await;
                    true
                }
                Some(dl) => {
                    let remaining = dl.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break Err(());
                    }
                    tokio::time::timeout(remaining, notified).await.is_ok()
                }
            };
            if !wait {
                break Err(());
            }

            let mut inner = self.state.lock();
            inner.refill();
            if inner.tokens >= tokens {
                inner.tokens -= tokens;
                break Ok(());
            }
            if let Some(dl) = deadline
                && Instant::now() >= dl
            {
                break Err(());
            }
        };
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        if result.is_err() {
            debug!("rate limit acquire timed out");
        }
        result
    }

    pub fn status(&self) -> BucketStatus {
        let mut inner = self.state.lock();
        inner.refill();
        BucketStatus {
            capacity: inner.capacity,
            current_tokens: inner.tokens,
            refill_rate: inner.refill_rate,
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }

    /// Spawns a ticker that periodically wakes every waiter so the bucket
    /// doesn't depend on a waiter's own acquire call to nudge the others.
    /// Holds only `Weak` handles so the task exits once every `TokenBucket`
    /// clone (including the one in `RateLimiter`'s bucket map) is dropped,
    /// and also exits as soon as `shutdown` fires.
    fn spawn_refill_ticker(&self, refill_rate: f64, shutdown: CancellationToken) {
        let state = Arc::downgrade(&self.state);
        let notify = Arc::downgrade(&self.notify);
        let waiting = Arc::downgrade(&self.waiting);
        let interval = Duration::from_secs_f64((1.0 / refill_rate.max(0.001)).min(1.0).max(0.01));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.cancelled() => break,
                }
                let (Some(state), Some(notify), Some(waiting)) =
                    (state.upgrade(), notify.upgrade(), waiting.upgrade())
                else {
                    break;
                };
                state.lock().refill();
                if waiting.load(Ordering::SeqCst) > 0 {
                    notify.notify_waiters();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refills_continuously() {
        let bucket = TokenBucket::new(2.0, 10.0, Some(0.0), CancellationToken::new());
        assert!(bucket.acquire(1.0, Some(Duration::from_millis(500))).await.is_ok());
    }

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let bucket = TokenBucket::new(2.0, 1000.0, Some(2.0), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = bucket.status();
        assert!(status.current_tokens <= 2.0);
    }
}
