//! In-process lock, TTL cache and pub/sub.
//!
//! Expired locks and cache entries are treated as absent on access, so a
//! crashed holder never wedges a key past its TTL. Channels are tokio
//! broadcast channels; a slow subscriber that lags skips ahead rather than
//! blocking publishers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::core::error::{ReservationError, ReservationResult};
use crate::core::ports::{Coordination, PayloadStream};
use crate::util::serde::LockToken;

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Single-process coordination backend.
pub struct InMemoryCoordination {
    locks: Mutex<HashMap<String, Expiring<LockToken>>>,
    cache: Mutex<HashMap<String, Expiring<String>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    channel_capacity: usize,
    offline: AtomicBool,
}

impl Default for InMemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordination {
    /// Backend with a per-channel buffer of 256 messages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(256)
    }

    /// Backend with a custom per-channel buffer.
    #[must_use]
    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            channel_capacity: channel_capacity.max(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails with `Unavailable` until restored.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Whether `key` is currently locked.
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.locks.lock().get(key).is_some_and(|l| l.live(now))
    }

    fn online(&self) -> ReservationResult<()> {
        if self.offline.load(Ordering::Acquire) {
            return Err(ReservationError::Unavailable("coordination backend offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Coordination for InMemoryCoordination {
    async fn acquire(&self, key: &str, ttl: Duration) -> ReservationResult<Option<LockToken>> {
        self.online()?;
        let now = Instant::now();
        let mut locks = self.locks.lock();
        if locks.get(key).is_some_and(|held| held.live(now)) {
            return Ok(None);
        }
        let token = LockToken::generate();
        locks.insert(
            key.to_string(),
            Expiring {
                value: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> ReservationResult<bool> {
        self.online()?;
        let now = Instant::now();
        let mut locks = self.locks.lock();
        match locks.get(key) {
            Some(held) if &held.value == token && held.live(now) => {
                locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> ReservationResult<Option<String>> {
        self.online()?;
        let now = Instant::now();
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some(entry) if entry.live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                cache.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> ReservationResult<()> {
        self.online()?;
        self.cache.lock().insert(
            key.to_string(),
            Expiring {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> ReservationResult<()> {
        self.online()?;
        self.cache.lock().remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: String) -> ReservationResult<usize> {
        self.online()?;
        let mut channels = self.channels.lock();
        let Some(sender) = channels.get(channel) else {
            return Ok(0);
        };
        if let Ok(reached) = sender.send(payload) {
            Ok(reached)
        } else {
            channels.remove(channel);
            Ok(0)
        }
    }

    async fn subscribe(&self, channel: &str) -> ReservationResult<PayloadStream> {
        self.online()?;
        let receiver = self
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe();
        let channel = channel.to_string();
        let stream = futures::stream::unfold(receiver, move |mut rx| {
            let channel = channel.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((payload, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(%channel, skipped, "subscriber lagged, skipping ahead");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let coord = InMemoryCoordination::new();
        let ttl = Duration::from_secs(5);
        let token = coord.acquire("k", ttl).await.unwrap().unwrap();
        assert!(coord.acquire("k", ttl).await.unwrap().is_none());
        assert!(!coord.release("k", &LockToken::generate()).await.unwrap());
        assert!(coord.release("k", &token).await.unwrap());
        assert!(coord.acquire("k", ttl).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn lock_expires_after_ttl() {
        let coord = InMemoryCoordination::new();
        let stale = coord
            .acquire("k", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        let fresh = coord.acquire("k", Duration::from_secs(1)).await.unwrap();
        assert!(fresh.is_some());
        // The stale holder can no longer release the new holder's lock.
        assert!(!coord.release("k", &stale).await.unwrap());
        assert!(coord.is_locked("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let coord = InMemoryCoordination::new();
        coord.set("c", "v".into(), Duration::from_millis(50)).await.unwrap();
        assert_eq!(coord.get("c").await.unwrap().as_deref(), Some("v"));
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(coord.get("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let coord = InMemoryCoordination::new();
        assert_eq!(coord.publish("ch", "lost".into()).await.unwrap(), 0);
        let mut stream = coord.subscribe("ch").await.unwrap();
        assert_eq!(coord.publish("ch", "hello".into()).await.unwrap(), 1);
        assert_eq!(stream.next().await.as_deref(), Some("hello"));
    }
}
