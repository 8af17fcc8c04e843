//! Bounded-wait acquisition on top of the coordination lock primitive.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LockConfig;
use crate::core::error::ReservationResult;
use crate::core::ports::Coordination;
use crate::util::serde::LockToken;

/// Lock keyed by string, acquired with a bounded wait and released by token.
#[derive(Clone)]
pub struct KeyedLock {
    coordination: Arc<dyn Coordination>,
    ttl: Duration,
    wait_timeout: Duration,
    poll_initial: Duration,
    poll_max: Duration,
}

impl KeyedLock {
    /// Build a lock helper from the locking configuration.
    pub fn new(coordination: Arc<dyn Coordination>, config: &LockConfig) -> Self {
        Self {
            coordination,
            ttl: config.lock_ttl(),
            wait_timeout: config.wait_timeout(),
            poll_initial: Duration::from_millis(config.poll_initial_ms),
            poll_max: Duration::from_millis(config.poll_max_ms),
        }
    }

    /// Wait up to the configured timeout for `key`.
    ///
    /// `Ok(None)` means the wait timed out; callers must fail closed. Backend
    /// errors are returned immediately.
    pub async fn acquire(&self, key: &str) -> ReservationResult<Option<LockToken>> {
        let started = Instant::now();
        let deadline = started + self.wait_timeout;
        let mut delay = self.poll_initial;
        loop {
            if let Some(token) = self.coordination.acquire(key, self.ttl).await? {
                tracing::debug!(
                    key,
                    waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "lock acquired"
                );
                return Ok(Some(token));
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(key, timeout_ms = u64::try_from(self.wait_timeout.as_millis()).unwrap_or(u64::MAX), "lock wait timed out");
                return Ok(None);
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(self.poll_max);
        }
    }

    /// Release `key`. Failures are logged; the TTL reclaims the key regardless.
    pub async fn release(&self, key: &str, token: &LockToken) {
        match self.coordination.release(key, token).await {
            Ok(true) => tracing::debug!(key, "lock released"),
            Ok(false) => tracing::warn!(key, "lock expired before release"),
            Err(err) => tracing::warn!(key, error = %err, "lock release failed"),
        }
    }
}
