//! Reservation coordinator: the single serialization point for contested capacity.
//!
//! A reservation decision runs entirely under a short-TTL lock keyed by
//! (business, location, day). Inside the lock the day is re-evaluated against
//! current bookings and unexpired pending holds; the winner's hold is written
//! before the lock is released. The durable booking write happens afterwards,
//! outside the lock, and the hold covers the gap between the two.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LockConfig;
use crate::core::availability::{AvailabilityCalculator, DayInventory, SlotQuery};
use crate::core::error::{ReservationError, ReservationResult};
use crate::core::lock::KeyedLock;
use crate::core::model::TimeWindow;
use crate::core::ports::Coordination;
use crate::util::clock::Clock;
use crate::util::serde::{key_segment, BusinessId, CustomerId, LocationId, ResourceId};

/// Reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Business.
    pub business_id: BusinessId,
    /// Location the resource must belong to.
    pub location_id: LocationId,
    /// Requested start, on the slot grid.
    pub start: NaiveDateTime,
    /// Party size.
    pub party_size: u32,
    /// Booking length; the business default applies when absent.
    pub duration_minutes: Option<u32>,
    /// Customer.
    pub customer_id: CustomerId,
}

impl ReserveRequest {
    fn slot_query(&self) -> SlotQuery {
        SlotQuery {
            business_id: self.business_id.clone(),
            location_id: Some(self.location_id.clone()),
            date: self.start.date(),
            party_size: self.party_size,
            duration_minutes: self.duration_minutes,
        }
    }
}

/// Ephemeral write guard between a decision and the durable booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReservation {
    /// Hold identifier.
    pub id: Uuid,
    /// Business.
    pub business_id: BusinessId,
    /// Location.
    pub location_id: LocationId,
    /// Chosen resource.
    pub resource_id: ResourceId,
    /// Held window.
    pub window: TimeWindow,
    /// Party size.
    pub party_size: u32,
    /// Customer.
    pub customer_id: CustomerId,
    /// Expiry in milliseconds since epoch.
    pub expires_at_ms: u128,
}

impl PendingReservation {
    fn live(&self, now_ms: u128) -> bool {
        self.expires_at_ms > now_ms
    }
}

/// Why a reservation could not be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    /// No in-service resource is large enough for the party.
    Overbooking,
    /// Large enough resources exist but all are taken for the window.
    TableUnavailable,
    /// The start is outside operating hours, off the slot grid, or the business is closed.
    TimeConflict,
}

/// Structured conflict with machine-readable alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConflict {
    /// Reason.
    pub reason: ConflictReason,
    /// Human-readable message.
    pub message: String,
    /// Nearby start times that were available at decision time.
    pub alternatives: Vec<NaiveDateTime>,
}

/// Decision outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveOutcome {
    /// The resource is held for the caller, who must now write the booking.
    Reserved(PendingReservation),
    /// Nothing could be granted.
    Conflict(SlotConflict),
}

impl ReserveOutcome {
    /// The hold, when reserved.
    #[must_use]
    pub const fn hold(&self) -> Option<&PendingReservation> {
        match self {
            Self::Reserved(hold) => Some(hold),
            Self::Conflict(_) => None,
        }
    }

    /// The conflict, when refused.
    #[must_use]
    pub const fn conflict(&self) -> Option<&SlotConflict> {
        match self {
            Self::Reserved(_) => None,
            Self::Conflict(conflict) => Some(conflict),
        }
    }
}

/// Identifies the hold(s) to clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRelease {
    /// Business.
    pub business_id: BusinessId,
    /// Location.
    pub location_id: LocationId,
    /// Resource.
    pub resource_id: ResourceId,
    /// Window; holds on the resource overlapping it are cleared.
    pub window: TimeWindow,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingHolds {
    holds: Vec<PendingReservation>,
}

impl PendingHolds {
    fn blocks(&self, resource_id: &ResourceId, window: &TimeWindow) -> bool {
        self.holds
            .iter()
            .any(|h| &h.resource_id == resource_id && h.window.overlaps(window))
    }
}

/// Lock key serializing reservation decisions for one location and day.
#[must_use]
pub fn reservation_lock_key(business_id: &str, location_id: &str, date: NaiveDate) -> String {
    format!(
        "lock:reserve:{}:{}:{date}",
        key_segment(business_id),
        key_segment(location_id)
    )
}

/// Cache key holding the pending reservations for one location and day.
#[must_use]
pub fn pending_key(business_id: &str, location_id: &str, date: NaiveDate) -> String {
    format!(
        "pending:{}:{}:{date}",
        key_segment(business_id),
        key_segment(location_id)
    )
}

/// Grants at most one reservation per contested resource and window.
pub struct ReservationCoordinator {
    calculator: Arc<AvailabilityCalculator>,
    coordination: Arc<dyn Coordination>,
    lock: KeyedLock,
    config: LockConfig,
    clock: Arc<dyn Clock>,
}

impl ReservationCoordinator {
    /// Build a coordinator.
    pub fn new(
        calculator: Arc<AvailabilityCalculator>,
        coordination: Arc<dyn Coordination>,
        config: LockConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lock = KeyedLock::new(Arc::clone(&coordination), &config);
        Self {
            calculator,
            coordination,
            lock,
            config,
            clock,
        }
    }

    /// Decide a reservation.
    ///
    /// Lock wait timeouts fail closed as a `TableUnavailable` conflict. Backend
    /// failures inside the decision are returned as errors and never retried.
    pub async fn reserve_slot(&self, request: &ReserveRequest) -> ReservationResult<ReserveOutcome> {
        if request.customer_id.trim().is_empty() {
            return Err(ReservationError::Validation("customer id is required".into()));
        }
        if request.location_id.trim().is_empty() {
            return Err(ReservationError::Validation("location id is required".into()));
        }
        let query = request.slot_query();
        self.calculator.validate(&query)?;

        let key = reservation_lock_key(&request.business_id, &request.location_id, query.date);
        let Some(token) = self.lock.acquire(&key).await? else {
            tracing::warn!(
                business = %request.business_id,
                location = %request.location_id,
                start = %request.start,
                "reservation lock busy, failing closed"
            );
            return Ok(ReserveOutcome::Conflict(SlotConflict {
                reason: ConflictReason::TableUnavailable,
                message: "another reservation for this time is being processed".into(),
                alternatives: Vec::new(),
            }));
        };

        let outcome = self.decide(request, &query).await;
        self.lock.release(&key, &token).await;
        outcome
    }

    /// Clear pending holds on a resource overlapping a window. Idempotent:
    /// returns `false` when nothing was held.
    pub async fn release_slot(&self, release: &SlotRelease) -> ReservationResult<bool> {
        let date = release.window.date();
        let key = reservation_lock_key(&release.business_id, &release.location_id, date);
        let Some(token) = self.lock.acquire(&key).await? else {
            return Err(ReservationError::Unavailable(
                "timed out waiting for the reservation lock".into(),
            ));
        };
        let cleared = self.clear_holds(release).await;
        self.lock.release(&key, &token).await;
        let cleared = cleared?;
        tracing::info!(
            business = %release.business_id,
            location = %release.location_id,
            resource = %release.resource_id,
            start = %release.window.start,
            cleared,
            "slot released"
        );
        Ok(cleared)
    }

    /// Unexpired holds for a location and day.
    pub async fn pending_holds(
        &self,
        business_id: &str,
        location_id: &str,
        date: NaiveDate,
    ) -> ReservationResult<Vec<PendingReservation>> {
        Ok(self
            .load_holds(&pending_key(business_id, location_id, date))
            .await?
            .holds)
    }

    async fn decide(
        &self,
        request: &ReserveRequest,
        query: &SlotQuery,
    ) -> ReservationResult<ReserveOutcome> {
        let inventory = self.calculator.load_day_once(query).await?;
        let holds_key = pending_key(&request.business_id, &request.location_id, query.date);
        let mut holds = self.load_holds(&holds_key).await?;

        if !inventory.accepts(request.start) {
            let message = if inventory.is_closed() {
                format!("closed on {}", query.date)
            } else {
                format!("{} is not a bookable start time", request.start)
            };
            return Ok(self.conflict(ConflictReason::TimeConflict, message, &inventory, &holds, request.start));
        }
        if !inventory.has_capacity_for_party() {
            return Ok(self.conflict(
                ConflictReason::Overbooking,
                format!("no table seats a party of {}", request.party_size),
                &inventory,
                &holds,
                request.start,
            ));
        }

        let window = inventory.window_at(request.start);
        let chosen = inventory
            .free_resources(&window)
            .find(|r| !holds.blocks(&r.id, &window))
            .cloned();
        let Some(resource) = chosen else {
            return Ok(self.conflict(
                ConflictReason::TableUnavailable,
                format!("no table free for a party of {} at {}", request.party_size, request.start),
                &inventory,
                &holds,
                request.start,
            ));
        };

        let ttl = self.config.pending_ttl();
        let hold = PendingReservation {
            id: Uuid::new_v4(),
            business_id: request.business_id.clone(),
            location_id: request.location_id.clone(),
            resource_id: resource.id.clone(),
            window,
            party_size: request.party_size,
            customer_id: request.customer_id.clone(),
            expires_at_ms: self.clock.now_ms() + ttl.as_millis(),
        };
        holds.holds.push(hold.clone());
        self.coordination
            .set(&holds_key, serde_json::to_string(&holds)?, ttl)
            .await?;
        tracing::info!(
            business = %request.business_id,
            location = %request.location_id,
            resource = %resource.id,
            capacity = resource.capacity,
            start = %request.start,
            party_size = request.party_size,
            "slot held"
        );
        Ok(ReserveOutcome::Reserved(hold))
    }

    fn conflict(
        &self,
        reason: ConflictReason,
        message: String,
        inventory: &DayInventory,
        holds: &PendingHolds,
        requested: NaiveDateTime,
    ) -> ReserveOutcome {
        let alternatives = self.alternatives(inventory, holds, requested);
        tracing::info!(?reason, %message, alternatives = alternatives.len(), "reservation refused");
        ReserveOutcome::Conflict(SlotConflict {
            reason,
            message,
            alternatives,
        })
    }

    /// Free starts within ± `alternative_steps` grid steps, nearest first, earlier on ties.
    fn alternatives(
        &self,
        inventory: &DayInventory,
        holds: &PendingHolds,
        requested: NaiveDateTime,
    ) -> Vec<NaiveDateTime> {
        let Some(granularity) = inventory.granularity_minutes() else {
            return Vec::new();
        };
        let radius = i64::from(granularity) * i64::from(self.config.alternative_steps);
        let mut found: Vec<(i64, NaiveDateTime)> = inventory
            .candidate_starts()
            .into_iter()
            .filter(|start| *start != requested)
            .map(|start| ((start - requested).num_minutes().abs(), start))
            .filter(|(distance, _)| *distance <= radius)
            .filter(|(_, start)| {
                let window = inventory.window_at(*start);
                let any_free = inventory
                    .free_resources(&window)
                    .any(|r| !holds.blocks(&r.id, &window));
                any_free
            })
            .collect();
        found.sort();
        found
            .into_iter()
            .take(self.config.max_alternatives)
            .map(|(_, start)| start)
            .collect()
    }

    async fn clear_holds(&self, release: &SlotRelease) -> ReservationResult<bool> {
        let key = pending_key(
            &release.business_id,
            &release.location_id,
            release.window.date(),
        );
        let mut holds = self.load_holds(&key).await?;
        let before = holds.holds.len();
        holds.holds.retain(|h| {
            !(h.resource_id == release.resource_id && h.window.overlaps(&release.window))
        });
        if holds.holds.len() == before {
            return Ok(false);
        }
        if holds.holds.is_empty() {
            self.coordination.delete(&key).await?;
        } else {
            self.coordination
                .set(&key, serde_json::to_string(&holds)?, self.config.pending_ttl())
                .await?;
        }
        Ok(true)
    }

    async fn load_holds(&self, key: &str) -> ReservationResult<PendingHolds> {
        let Some(raw) = self.coordination.get(key).await? else {
            return Ok(PendingHolds::default());
        };
        let mut holds: PendingHolds = serde_json::from_str(&raw)?;
        let now = self.clock.now_ms();
        holds.holds.retain(|h| h.live(now));
        Ok(holds)
    }
}
