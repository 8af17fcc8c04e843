//! Walk-in waitlist with a dense, renumbered position sequence.
//!
//! Every mutation of a queue (join, remove, estimate refresh, notify) runs
//! under the coordination lock for its (business, location), so WAITING
//! positions stay exactly `1..=k` even when removals race. Joins also hold a
//! per-customer lock for the business, so one customer cannot be WAITING in
//! two of its queues at once.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::{LockConfig, WaitlistConfig};
use crate::core::error::{ReservationError, ReservationResult};
use crate::core::lock::KeyedLock;
use crate::core::model::{WaitlistEntry, WaitlistStatus};
use crate::core::notify::Notifier;
use crate::core::ports::{Coordination, TemplateKind, WaitlistStore};
use crate::util::clock::Clock;
use crate::util::serde::{key_segment, BusinessId, CustomerId, LocationId, Scope, WaitlistEntryId};

/// Request to join a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Business.
    pub business_id: BusinessId,
    /// Location; `None` joins the business-wide queue.
    pub location_id: Option<LocationId>,
    /// Customer.
    pub customer_id: CustomerId,
    /// Party size.
    pub party_size: u32,
    /// Name staff call out.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Why an entry leaves the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalReason {
    /// Got a table.
    Seated,
    /// Walked away.
    Left,
}

impl From<RemovalReason> for WaitlistStatus {
    fn from(reason: RemovalReason) -> Self {
        match reason {
            RemovalReason::Seated => Self::Seated,
            RemovalReason::Left => Self::Left,
        }
    }
}

/// Where an entry stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistPosition {
    /// Entry.
    pub entry_id: WaitlistEntryId,
    /// Status.
    pub status: WaitlistStatus,
    /// 1-based position while WAITING.
    pub position: Option<u32>,
    /// Parties ahead while WAITING.
    pub parties_ahead: u32,
    /// Estimated wait while WAITING.
    pub estimated_wait_minutes: Option<u32>,
}

/// Queue summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistStats {
    /// Parties waiting now.
    pub waiting: u32,
    /// Trailing average wait used for estimates.
    pub average_wait_minutes: u32,
    /// Whether the average came from history rather than the fallback.
    pub from_history: bool,
    /// How long the longest-waiting party has been waiting.
    pub longest_current_wait_minutes: u32,
    /// Parties seated in the trailing window.
    pub seated: u32,
    /// Parties that left in the trailing window.
    pub left: u32,
}

/// Lock key serializing mutations of one queue.
#[must_use]
pub fn waitlist_lock_key(business_id: &str, location_id: Option<&str>) -> String {
    let scope = Scope::new(business_id, location_id.map(str::to_owned));
    format!("lock:waitlist:{scope}")
}

/// Lock key serializing one customer's joins across every queue of a business.
#[must_use]
pub fn waitlist_customer_lock_key(business_id: &str, customer_id: &str) -> String {
    format!(
        "lock:waitlist-customer:{}:{}",
        key_segment(business_id),
        key_segment(customer_id)
    )
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    u32::try_from((to - from).num_minutes().max(0)).unwrap_or(u32::MAX)
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Maintains waitlist ordering, estimates and "you're next" notifications.
pub struct WaitlistManager {
    store: Arc<dyn WaitlistStore>,
    lock: KeyedLock,
    notifier: Notifier,
    config: WaitlistConfig,
    clock: Arc<dyn Clock>,
}

impl WaitlistManager {
    /// Build a manager.
    pub fn new(
        store: Arc<dyn WaitlistStore>,
        coordination: Arc<dyn Coordination>,
        notifier: Notifier,
        lock_config: &LockConfig,
        config: WaitlistConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            lock: KeyedLock::new(coordination, lock_config),
            notifier,
            config,
            clock,
        }
    }

    /// Join the queue at the back.
    pub async fn join(&self, request: JoinRequest) -> ReservationResult<WaitlistEntry> {
        if request.business_id.trim().is_empty() {
            return Err(ReservationError::Validation("business id is required".into()));
        }
        if request.customer_id.trim().is_empty() {
            return Err(ReservationError::Validation("customer id is required".into()));
        }
        if request.party_size == 0 {
            return Err(ReservationError::Validation("party size must be at least 1".into()));
        }

        let business_id = request.business_id.clone();
        let location_id = request.location_id.clone();
        let customer_key = waitlist_customer_lock_key(&business_id, &request.customer_id);
        let entry = self
            .locked_key(&customer_key, || {
                self.locked(&business_id, location_id.as_ref(), || self.append(&request))
            })
            .await?;

        tracing::info!(
            business = %entry.business_id,
            location = entry.location_id.as_deref().unwrap_or("*"),
            entry = %entry.id,
            position = entry.position,
            estimate = entry.estimated_wait_minutes,
            "joined waitlist"
        );
        self.notifier.notify(
            &entry.customer_id,
            TemplateKind::WaitlistJoined,
            json!({
                "entry_id": entry.id,
                "display_name": entry.display_name,
                "position": entry.position,
                "estimated_wait_minutes": entry.estimated_wait_minutes,
            }),
        );
        Ok(entry)
    }

    /// Take an entry out of the queue and close the gap behind it.
    pub async fn remove(
        &self,
        entry_id: &WaitlistEntryId,
        reason: RemovalReason,
    ) -> ReservationResult<WaitlistEntry> {
        let entry = self.get(entry_id).await?;
        let removed = self
            .locked(&entry.business_id, entry.location_id.as_ref(), || async {
                let mut entry = self.get(entry_id).await?;
                if entry.status != WaitlistStatus::Waiting {
                    return Err(ReservationError::Conflict(format!(
                        "waitlist entry {} is already {:?}",
                        entry.id, entry.status
                    )));
                }
                let now = self.clock.now();
                let vacated = entry.position;
                entry.status = reason.into();
                match reason {
                    RemovalReason::Seated => entry.seated_at = Some(now),
                    RemovalReason::Left => entry.left_at = Some(now),
                }
                entry.actual_wait_minutes = Some(minutes_between(entry.joined_at, now));

                let mut changed = vec![entry.clone()];
                let behind = self
                    .store
                    .waitlist_entries(&entry.business_id, entry.location_id.as_ref(), &[WaitlistStatus::Waiting])
                    .await?
                    .into_iter()
                    .filter(|e| e.id != entry.id && e.position > vacated);
                for mut other in behind {
                    other.position -= 1;
                    changed.push(other);
                }
                let shifted = changed.len() - 1;
                self.store.update_waitlist_entries(changed).await?;
                tracing::debug!(entry = %entry.id, vacated, shifted, "waitlist renumbered");
                self.refresh_estimates_after_write(&entry.business_id, entry.location_id.as_ref())
                    .await;
                Ok(entry)
            })
            .await?;

        tracing::info!(
            business = %removed.business_id,
            location = removed.location_id.as_deref().unwrap_or("*"),
            entry = %removed.id,
            ?reason,
            waited = removed.actual_wait_minutes.unwrap_or_default(),
            "left waitlist"
        );
        Ok(removed)
    }

    /// Recompute every WAITING estimate as trailing average × position.
    pub async fn update_wait_time_estimates(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        self.locked(business_id, location_id, || {
            self.recompute_estimates(business_id, location_id)
        })
        .await
    }

    /// Trailing average seated wait in minutes, and whether it came from history.
    pub async fn average_wait_minutes(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
    ) -> ReservationResult<(u32, bool)> {
        let since = self.history_start();
        let waits: Vec<i64> = self
            .store
            .seated_since(business_id, location_id, since)
            .await?
            .iter()
            .filter_map(WaitlistEntry::seated_wait)
            .map(|wait| wait.num_minutes().max(0))
            .collect();
        if waits.is_empty() {
            return Ok((self.config.fallback_wait_minutes, false));
        }
        let count = i64::try_from(waits.len()).unwrap_or(i64::MAX);
        let average = waits.iter().sum::<i64>() / count;
        Ok((u32::try_from(average).unwrap_or(u32::MAX), true))
    }

    /// Where an entry stands in its queue.
    pub async fn position(&self, entry_id: &WaitlistEntryId) -> ReservationResult<WaitlistPosition> {
        let entry = self.get(entry_id).await?;
        let waiting = entry.status == WaitlistStatus::Waiting;
        Ok(WaitlistPosition {
            entry_id: entry.id,
            status: entry.status,
            position: waiting.then_some(entry.position),
            parties_ahead: if waiting { entry.position.saturating_sub(1) } else { 0 },
            estimated_wait_minutes: waiting.then_some(entry.estimated_wait_minutes),
        })
    }

    /// WAITING entries in position order.
    pub async fn waiting(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        let mut waiting = self
            .store
            .waitlist_entries(business_id, location_id, &[WaitlistStatus::Waiting])
            .await?;
        waiting.sort_by_key(|e| e.position);
        Ok(waiting)
    }

    /// Tell the first `count` waiting parties that their table is nearly ready.
    /// Statuses are left unchanged; seating is a separate call.
    pub async fn notify_next(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        count: usize,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let notified = self
            .locked(business_id, location_id, || async {
                let now = self.clock.now();
                let next: Vec<WaitlistEntry> = self
                    .waiting(business_id, location_id)
                    .await?
                    .into_iter()
                    .take(count)
                    .map(|mut e| {
                        e.notification_count += 1;
                        e.last_notified_at = Some(now);
                        e
                    })
                    .collect();
                if !next.is_empty() {
                    self.store.update_waitlist_entries(next.clone()).await?;
                }
                Ok(next)
            })
            .await?;

        for entry in &notified {
            self.notifier.notify(
                &entry.customer_id,
                TemplateKind::WaitlistReady,
                json!({
                    "entry_id": entry.id,
                    "display_name": entry.display_name,
                    "position": entry.position,
                    "notification_count": entry.notification_count,
                }),
            );
        }
        tracing::info!(business = %business_id, requested = count, notified = notified.len(), "notified next parties");
        Ok(notified)
    }

    /// Queue summary over the trailing history window.
    pub async fn stats(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
    ) -> ReservationResult<WaitlistStats> {
        let now = self.clock.now();
        let since = self.history_start();
        let entries = self
            .store
            .waitlist_entries(
                business_id,
                location_id,
                &[WaitlistStatus::Waiting, WaitlistStatus::Seated, WaitlistStatus::Left],
            )
            .await?;
        let (average_wait_minutes, from_history) =
            self.average_wait_minutes(business_id, location_id).await?;

        let waiting: Vec<&WaitlistEntry> = entries
            .iter()
            .filter(|e| e.status == WaitlistStatus::Waiting)
            .collect();
        let longest_current_wait_minutes = waiting
            .iter()
            .map(|e| minutes_between(e.joined_at, now))
            .max()
            .unwrap_or(0);
        let seated = entries
            .iter()
            .filter(|e| e.seated_at.is_some_and(|at| at >= since))
            .count();
        let left = entries
            .iter()
            .filter(|e| e.left_at.is_some_and(|at| at >= since))
            .count();

        Ok(WaitlistStats {
            waiting: len_u32(waiting.len()),
            average_wait_minutes,
            from_history,
            longest_current_wait_minutes,
            seated: len_u32(seated),
            left: len_u32(left),
        })
    }

    async fn get(&self, entry_id: &WaitlistEntryId) -> ReservationResult<WaitlistEntry> {
        self.store
            .get_waitlist_entry(entry_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("waitlist entry {entry_id}")))
    }

    fn history_start(&self) -> DateTime<Utc> {
        self.clock.now() - Duration::days(i64::from(self.config.history_days))
    }

    async fn recompute_estimates(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        let (average, _) = self.average_wait_minutes(business_id, location_id).await?;
        let mut waiting = self.waiting(business_id, location_id).await?;
        let mut changed = Vec::new();
        for entry in &mut waiting {
            let estimate = average.saturating_mul(entry.position);
            if entry.estimated_wait_minutes != estimate {
                entry.estimated_wait_minutes = estimate;
                changed.push(entry.clone());
            }
        }
        if !changed.is_empty() {
            self.store.update_waitlist_entries(changed).await?;
        }
        Ok(waiting)
    }

    /// Duplicate check and insert at the back. Runs under both join locks.
    async fn append(&self, request: &JoinRequest) -> ReservationResult<WaitlistEntry> {
        let existing = self
            .store
            .waiting_for_customer(&request.business_id, &request.customer_id)
            .await?;
        if !existing.is_empty() {
            return Err(ReservationError::Conflict(format!(
                "customer {} is already waiting",
                request.customer_id
            )));
        }
        let waiting = self
            .store
            .waitlist_entries(&request.business_id, request.location_id.as_ref(), &[WaitlistStatus::Waiting])
            .await?;
        let position = waiting.iter().map(|e| e.position).max().unwrap_or(0) + 1;
        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            business_id: request.business_id.clone(),
            location_id: request.location_id.clone(),
            customer_id: request.customer_id.clone(),
            display_name: request.display_name.clone(),
            notes: request.notes.clone(),
            party_size: request.party_size,
            position,
            status: WaitlistStatus::Waiting,
            joined_at: self.clock.now(),
            seated_at: None,
            left_at: None,
            estimated_wait_minutes: 0,
            actual_wait_minutes: None,
            notification_count: 0,
            last_notified_at: None,
        };
        let inserted = self.store.insert_waitlist_entry(entry).await?;
        let refreshed = self
            .refresh_estimates_after_write(&inserted.business_id, inserted.location_id.as_ref())
            .await;
        Ok(refreshed
            .into_iter()
            .find(|e| e.id == inserted.id)
            .unwrap_or(inserted))
    }

    /// Estimate refresh following a committed write. A failure here must not
    /// turn the committed join or removal into an error.
    async fn refresh_estimates_after_write(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
    ) -> Vec<WaitlistEntry> {
        match self.recompute_estimates(business_id, location_id).await {
            Ok(waiting) => waiting,
            Err(err) => {
                tracing::warn!(business = %business_id, error = %err, "wait estimate refresh failed");
                Vec::new()
            }
        }
    }

    async fn locked<T, F, Fut>(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        operation: F,
    ) -> ReservationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ReservationResult<T>>,
    {
        let key = waitlist_lock_key(business_id, location_id.map(String::as_str));
        self.locked_key(&key, operation).await
    }

    async fn locked_key<T, F, Fut>(&self, key: &str, operation: F) -> ReservationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ReservationResult<T>>,
    {
        let Some(token) = self.lock.acquire(key).await? else {
            return Err(ReservationError::Unavailable(
                "timed out waiting for the waitlist lock".into(),
            ));
        };
        let result = operation().await;
        self.lock.release(key, &token).await;
        result
    }
}
