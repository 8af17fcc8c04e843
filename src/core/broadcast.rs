//! Live availability broadcast with coalescing.
//!
//! Changes are recomputed into a latest-value buffer keyed by
//! (business, location, date). One debounced timer flushes the buffer: every
//! `notify` pushes the deadline back, and when it finally passes each buffered
//! key is published exactly once. The debouncer is a two-state machine
//! (`Idle` / `Buffering`) owned by a single mutex.
//!
//! A background refresher re-publishes keys with live subscribers when their
//! slot list drifts from what was last sent (e.g. after a manual edit the
//! event path never saw).

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::core::availability::{AvailabilityCalculator, SlotQuery};
use crate::core::error::ReservationResult;
use crate::core::model::AvailabilitySlot;
use crate::core::ports::{spawn_detached, Coordination, Spawn};
use crate::util::clock::Clock;
use crate::util::serde::{BusinessId, LocationId, Scope, SubscriptionId};

/// What caused an availability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    /// A booking was created.
    BookingCreated,
    /// A booking was cancelled or marked no-show.
    BookingCancelled,
    /// A booking changed status otherwise.
    BookingUpdated,
    /// A resource's status was edited.
    TableStatusChanged,
    /// Periodic drift correction.
    Refresh,
}

/// Broadcast buffer and subscription key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastKey {
    /// Business and optional location.
    pub scope: Scope,
    /// Day.
    pub date: NaiveDate,
}

impl BroadcastKey {
    /// Build a key.
    pub fn new(business_id: impl Into<BusinessId>, location_id: Option<LocationId>, date: NaiveDate) -> Self {
        Self {
            scope: Scope::new(business_id, location_id),
            date,
        }
    }

    /// Pub/sub channel name.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("availability:{}:{}", self.scope, self.date)
    }
}

/// Event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityChanged {
    /// Business.
    pub business_id: BusinessId,
    /// Location, `None` for business-wide views.
    pub location_id: Option<LocationId>,
    /// Day.
    pub date: NaiveDate,
    /// Slots for a party of one, listing every resource with its availability.
    pub slots: Vec<AvailabilitySlot>,
    /// Cause of the latest change folded into this event.
    pub change_type: ChangeType,
    /// When the slot list was computed.
    pub timestamp: DateTime<Utc>,
}

impl AvailabilityChanged {
    fn key(&self) -> BroadcastKey {
        BroadcastKey::new(self.business_id.clone(), self.location_id.clone(), self.date)
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Buffering { deadline: Instant },
}

struct Debouncer {
    phase: Phase,
    buffer: HashMap<BroadcastKey, AvailabilityChanged>,
}

struct SubscriptionRecord {
    key: BroadcastKey,
    expires_at: Instant,
    _cancel: oneshot::Sender<()>,
}

/// A live viewer's subscription. The event stream ends on `unsubscribe` or expiry.
pub struct AvailabilitySubscription {
    /// Identifier used to unsubscribe.
    pub id: SubscriptionId,
    /// Subscribed key.
    pub key: BroadcastKey,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    events: Pin<Box<dyn Stream<Item = AvailabilityChanged> + Send>>,
}

impl AvailabilitySubscription {
    /// Next event, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<AvailabilityChanged> {
        self.events.next().await
    }

    /// Consume into the underlying event stream.
    #[must_use]
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = AvailabilityChanged> + Send>> {
        self.events
    }
}

impl std::fmt::Debug for AvailabilitySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilitySubscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

struct Inner {
    calculator: Arc<AvailabilityCalculator>,
    coordination: Arc<dyn Coordination>,
    spawner: Arc<dyn Spawn>,
    clock: Arc<dyn Clock>,
    config: BroadcastConfig,
    debouncer: Mutex<Debouncer>,
    subscriptions: Mutex<HashMap<SubscriptionId, SubscriptionRecord>>,
    last_published: Mutex<HashMap<BroadcastKey, Vec<AvailabilitySlot>>>,
    shutdown: watch::Sender<bool>,
    refresher_started: AtomicBool,
}

/// Coalescing fan-out of availability changes to live viewers.
#[derive(Clone)]
pub struct AvailabilityBroadcaster {
    inner: Arc<Inner>,
}

impl AvailabilityBroadcaster {
    /// Build a broadcaster. Call [`start`](Self::start) to run the refresher.
    pub fn new(
        calculator: Arc<AvailabilityCalculator>,
        coordination: Arc<dyn Coordination>,
        spawner: Arc<dyn Spawn>,
        clock: Arc<dyn Clock>,
        config: BroadcastConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                calculator,
                coordination,
                spawner,
                clock,
                config,
                debouncer: Mutex::new(Debouncer {
                    phase: Phase::Idle,
                    buffer: HashMap::new(),
                }),
                subscriptions: Mutex::new(HashMap::new()),
                last_published: Mutex::new(HashMap::new()),
                shutdown,
                refresher_started: AtomicBool::new(false),
            }),
        }
    }

    /// Record a change. Recomputes every affected key that has a live viewer
    /// (the exact key and, for a location, the business-wide key), buffers the
    /// result and pushes the flush deadline back. Never fails the caller.
    pub async fn notify(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        date: NaiveDate,
        change_type: ChangeType,
    ) {
        let mut affected = vec![BroadcastKey::new(business_id.clone(), location_id.cloned(), date)];
        if location_id.is_some() {
            affected.push(BroadcastKey::new(business_id.clone(), None, date));
        }
        let live = self.inner.live_keys();
        affected.retain(|key| live.contains(key));
        if affected.is_empty() {
            tracing::debug!(business = %business_id, %date, ?change_type, "no live viewers, change not buffered");
            return;
        }

        for key in affected {
            match self.inner.compute(&key).await {
                Ok(slots) => {
                    let event = AvailabilityChanged {
                        business_id: key.scope.business_id.clone(),
                        location_id: key.scope.location_id.clone(),
                        date,
                        slots,
                        change_type,
                        timestamp: self.inner.clock.now(),
                    };
                    self.inner.debouncer.lock().buffer.insert(key, event);
                }
                Err(err) => {
                    tracing::warn!(channel = %key.channel(), error = %err, "availability recompute failed, refresher will retry");
                }
            }
        }
        Inner::arm_timer(&self.inner);
    }

    /// Record a change that is not tied to one day, such as a resource status
    /// edit: every watched date of the location (or the business-wide view) is recomputed.
    pub async fn notify_all_dates(
        &self,
        business_id: &BusinessId,
        location_id: &LocationId,
        change_type: ChangeType,
    ) {
        let mut dates: Vec<NaiveDate> = self
            .inner
            .live_keys()
            .into_iter()
            .filter(|key| {
                &key.scope.business_id == business_id
                    && key
                        .scope
                        .location_id
                        .as_ref()
                        .is_none_or(|location| location == location_id)
            })
            .map(|key| key.date)
            .collect();
        dates.sort_unstable();
        dates.dedup();
        for date in dates {
            self.notify(business_id, Some(location_id), date, change_type).await;
        }
    }

    /// Subscribe a viewer to (business, location, date).
    pub async fn subscribe(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        date: NaiveDate,
    ) -> ReservationResult<AvailabilitySubscription> {
        let key = BroadcastKey::new(business_id.clone(), location_id.cloned(), date);
        let raw = self.inner.coordination.subscribe(&key.channel()).await?;
        let ttl = self.inner.config.subscription_ttl();
        let id = Uuid::new_v4();
        let (cancel, cancelled) = oneshot::channel::<()>();

        let expiry = tokio::time::sleep(ttl);
        let ended = async move {
            tokio::select! {
                () = expiry => {}
                _ = cancelled => {}
            }
        };
        let events = raw
            .filter_map(|payload| async move {
                match serde_json::from_str::<AvailabilityChanged>(&payload) {
                    Ok(event) => Some(event),
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping malformed availability event");
                        None
                    }
                }
            })
            .take_until(ended);

        self.inner.subscriptions.lock().insert(
            id,
            SubscriptionRecord {
                key: key.clone(),
                expires_at: Instant::now() + ttl,
                _cancel: cancel,
            },
        );
        let expires_at = self.inner.clock.now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(4));
        tracing::debug!(subscription = %id, channel = %key.channel(), "viewer subscribed");
        Ok(AvailabilitySubscription {
            id,
            key,
            expires_at,
            events: Box::pin(events),
        })
    }

    /// End a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.inner.subscriptions.lock().remove(id).is_some();
        tracing::debug!(subscription = %id, removed, "viewer unsubscribed");
        removed
    }

    /// Live subscriptions for a key.
    #[must_use]
    pub fn subscriber_count(&self, key: &BroadcastKey) -> usize {
        let now = Instant::now();
        self.inner
            .subscriptions
            .lock()
            .values()
            .filter(|s| &s.key == key && s.expires_at > now)
            .count()
    }

    /// Whether a flush is pending.
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        matches!(self.inner.debouncer.lock().phase, Phase::Buffering { .. })
    }

    /// Run one refresh pass now. Returns the number of keys re-published.
    pub async fn refresh_once(&self) -> usize {
        Inner::refresh(&self.inner).await
    }

    /// Start the background refresher. Idempotent.
    pub fn start(&self) {
        if self.inner.refresher_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let mut shutdown = inner.shutdown.subscribe();
        let period = inner.config.refresh_interval();
        spawn_detached(self.inner.spawner.as_ref(), async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let published = Inner::refresh(&inner).await;
                        tracing::debug!(published, "availability refresh pass");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("availability refresher stopped");
        });
        tracing::info!(interval_secs = period.as_secs(), "availability refresher started");
    }

    /// Stop the background refresher.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }
}

impl Inner {
    fn live_keys(&self) -> HashSet<BroadcastKey> {
        let now = Instant::now();
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|_, s| s.expires_at > now);
        subscriptions.values().map(|s| s.key.clone()).collect()
    }

    async fn compute(&self, key: &BroadcastKey) -> ReservationResult<Vec<AvailabilitySlot>> {
        let query = SlotQuery::new(
            key.scope.business_id.clone(),
            key.scope.location_id.clone(),
            key.date,
            1,
        );
        self.calculator.available_slots(&query).await
    }

    fn arm_timer(inner: &Arc<Self>) {
        let deadline = Instant::now() + inner.config.debounce();
        let mut debouncer = inner.debouncer.lock();
        match debouncer.phase {
            Phase::Idle => {
                debouncer.phase = Phase::Buffering { deadline };
                drop(debouncer);
                let timer = Arc::clone(inner);
                spawn_detached(inner.spawner.as_ref(), async move {
                    Self::run_flush_timer(timer).await;
                });
            }
            Phase::Buffering { .. } => {
                debouncer.phase = Phase::Buffering { deadline };
            }
        }
    }

    async fn run_flush_timer(inner: Arc<Self>) {
        let batch = loop {
            let wait = {
                let mut debouncer = inner.debouncer.lock();
                let Phase::Buffering { deadline } = debouncer.phase else {
                    return;
                };
                let now = Instant::now();
                if now >= deadline {
                    debouncer.phase = Phase::Idle;
                    break std::mem::take(&mut debouncer.buffer);
                }
                deadline - now
            };
            tokio::time::sleep(wait).await;
        };
        tracing::debug!(keys = batch.len(), "flushing availability buffer");
        for event in batch.into_values() {
            inner.publish(event).await;
        }
    }

    async fn publish(&self, event: AvailabilityChanged) {
        let key = event.key();
        let channel = key.channel();
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(%channel, error = %err, "failed to encode availability event");
                return;
            }
        };
        match self.coordination.publish(&channel, payload).await {
            Ok(reached) => {
                tracing::info!(%channel, reached, change = ?event.change_type, "availability broadcast");
                self.last_published.lock().insert(key, event.slots);
            }
            Err(err) => tracing::warn!(%channel, error = %err, "availability publish failed"),
        }
    }

    async fn refresh(inner: &Arc<Self>) -> usize {
        let keys = inner.live_keys();
        inner
            .last_published
            .lock()
            .retain(|key, _| keys.contains(key));
        let mut published = 0;
        for key in keys {
            let slots = match inner.compute(&key).await {
                Ok(slots) => slots,
                Err(err) => {
                    tracing::debug!(channel = %key.channel(), error = %err, "refresh skipped");
                    continue;
                }
            };
            let unchanged = inner.last_published.lock().get(&key) == Some(&slots);
            if unchanged {
                continue;
            }
            inner
                .publish(AvailabilityChanged {
                    business_id: key.scope.business_id.clone(),
                    location_id: key.scope.location_id.clone(),
                    date: key.date,
                    slots,
                    change_type: ChangeType::Refresh,
                    timestamp: inner.clock.now(),
                })
                .await;
            published += 1;
        }
        published
    }
}
