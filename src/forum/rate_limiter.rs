//! Minimum-spacing rate limiter shared by every outbound API call.
//!
//! The forum backend throttles aggressively, so the whole process keeps at
//! least `spacing` between two calls regardless of which task issues them.
//! Clones share the same state.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
}

struct RateLimiterInner {
    spacing: Duration,
    /// When the last call was allowed through
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                spacing,
                last_call: None,
            })),
        }
    }

    /// Wait until a call is allowed, then return.
    ///
    /// The lock is held while sleeping so that concurrent callers queue up
    /// behind each other instead of all waking at the same instant.
    pub async fn acquire(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(last) = inner.last_call {
            let elapsed = last.elapsed();
            if elapsed < inner.spacing {
                tokio::time::sleep(inner.spacing - elapsed).await;
            }
        }
        inner.last_call = Some(Instant::now());
    }
}
