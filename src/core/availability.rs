//! Slot availability calculation.
//!
//! Availability is always recomputed from current booking state. The pending
//! hold cache is a write-side guard and is never consulted here.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::SlotConfig;
use crate::core::error::{ReservationError, ReservationResult};
use crate::core::model::{
    AvailabilitySlot, BookingStatus, Business, OperatingWindow, Resource, ResourceAvailability,
    TimeWindow,
};
use crate::core::ports::ResourceStore;
use crate::util::clock::Clock;
use crate::util::retry::{retry_with_backoff, RetryPolicy};
use crate::util::serde::{BusinessId, LocationId};

/// Availability request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotQuery {
    /// Business.
    pub business_id: BusinessId,
    /// Restrict to one location.
    pub location_id: Option<LocationId>,
    /// Day to compute.
    pub date: NaiveDate,
    /// Party size.
    pub party_size: u32,
    /// Booking length; the business default applies when absent.
    pub duration_minutes: Option<u32>,
}

impl SlotQuery {
    /// Query with the business default duration.
    pub fn new(
        business_id: impl Into<BusinessId>,
        location_id: Option<LocationId>,
        date: NaiveDate,
        party_size: u32,
    ) -> Self {
        Self {
            business_id: business_id.into(),
            location_id,
            date,
            party_size,
            duration_minutes: None,
        }
    }

    /// Override the booking length.
    #[must_use]
    pub const fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }
}

#[derive(Debug, Clone)]
struct ResourceSchedule {
    resource: Resource,
    busy: Vec<TimeWindow>,
}

impl ResourceSchedule {
    fn free_during(&self, window: &TimeWindow) -> bool {
        !self.busy.iter().any(|b| b.overlaps(window))
    }
}

/// Snapshot of one day: hours, qualifying resources and their booked windows.
///
/// Loaded once per query so that every candidate start is evaluated against
/// the same view.
#[derive(Debug, Clone)]
pub struct DayInventory {
    business: Business,
    window: Option<OperatingWindow>,
    date: NaiveDate,
    party_size: u32,
    duration_minutes: u32,
    /// In-service resources large enough for the party, smallest first then by id.
    schedules: Vec<ResourceSchedule>,
}

impl DayInventory {
    /// Business the day belongs to.
    #[must_use]
    pub const fn business(&self) -> &Business {
        &self.business
    }

    /// Opening hours, `None` when closed.
    #[must_use]
    pub const fn operating_window(&self) -> Option<&OperatingWindow> {
        self.window.as_ref()
    }

    /// Day.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Effective booking length.
    #[must_use]
    pub const fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    /// Party size the inventory was loaded for.
    #[must_use]
    pub const fn party_size(&self) -> u32 {
        self.party_size
    }

    /// Whether the business is closed that day.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.window.is_none()
    }

    /// Whether any in-service resource could seat the party at all.
    #[must_use]
    pub fn has_capacity_for_party(&self) -> bool {
        !self.schedules.is_empty()
    }

    /// Slot grid step, if open.
    #[must_use]
    pub fn granularity_minutes(&self) -> Option<u32> {
        self.window.as_ref().map(|w| w.granularity_minutes)
    }

    /// Candidate start times; empty when closed.
    #[must_use]
    pub fn candidate_starts(&self) -> Vec<NaiveDateTime> {
        self.window
            .as_ref()
            .map(|w| w.candidate_starts(self.date, self.duration_minutes))
            .unwrap_or_default()
    }

    /// Whether `start` is a valid candidate start.
    #[must_use]
    pub fn accepts(&self, start: NaiveDateTime) -> bool {
        start.date() == self.date
            && self
                .window
                .as_ref()
                .is_some_and(|w| w.accepts(start, self.duration_minutes))
    }

    /// Booking window for a start time.
    #[must_use]
    pub fn window_at(&self, start: NaiveDateTime) -> TimeWindow {
        TimeWindow::starting_at(start, self.duration_minutes)
    }

    /// Resources with no overlapping booking in `window`, smallest first then by id.
    pub fn free_resources<'a>(
        &'a self,
        window: &'a TimeWindow,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.schedules
            .iter()
            .filter(move |s| s.free_during(window))
            .map(|s| &s.resource)
    }

    /// Evaluate one start time.
    #[must_use]
    pub fn evaluate(&self, start: NaiveDateTime) -> AvailabilitySlot {
        let window = self.window_at(start);
        let mut total_capacity = 0;
        let mut reserved = 0;
        let resources: Vec<ResourceAvailability> = self
            .schedules
            .iter()
            .map(|s| {
                let available = s.free_during(&window);
                total_capacity += s.resource.capacity;
                if !available {
                    reserved += s.resource.capacity;
                }
                ResourceAvailability {
                    resource_id: s.resource.id.clone(),
                    capacity: s.resource.capacity,
                    available,
                }
            })
            .collect();
        AvailabilitySlot {
            time: start,
            total_capacity,
            reserved,
            available: resources.iter().any(|r| r.available),
            resources,
        }
    }

    /// Every slot of the day.
    #[must_use]
    pub fn slots(&self) -> Vec<AvailabilitySlot> {
        self.candidate_starts()
            .into_iter()
            .map(|start| self.evaluate(start))
            .collect()
    }
}

/// Derives bookable slots from operating hours, resources and bookings.
pub struct AvailabilityCalculator {
    store: Arc<dyn ResourceStore>,
    config: SlotConfig,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl AvailabilityCalculator {
    /// Build a calculator.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        config: SlotConfig,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            retry,
            clock,
        }
    }

    /// Slot configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SlotConfig {
        &self.config
    }

    /// Reject malformed queries before touching the store.
    pub fn validate(&self, query: &SlotQuery) -> ReservationResult<()> {
        if query.business_id.trim().is_empty() {
            return Err(ReservationError::Validation("business id is required".into()));
        }
        if query.party_size == 0 || query.party_size > self.config.max_party_size {
            return Err(ReservationError::Validation(format!(
                "party size must be between 1 and {}",
                self.config.max_party_size
            )));
        }
        if let Some(minutes) = query.duration_minutes {
            if minutes == 0 || minutes > self.config.max_duration_minutes {
                return Err(ReservationError::Validation(format!(
                    "duration must be between 1 and {} minutes",
                    self.config.max_duration_minutes
                )));
            }
        }
        Ok(())
    }

    /// All slots for the query's day. Empty only when closed or when no start fits.
    pub async fn available_slots(&self, query: &SlotQuery) -> ReservationResult<Vec<AvailabilitySlot>> {
        let inventory = self.load_day(query).await?;
        let slots = inventory.slots();
        tracing::debug!(
            business = %query.business_id,
            date = %query.date,
            party_size = query.party_size,
            slots = slots.len(),
            open = slots.iter().filter(|s| s.available).count(),
            "computed availability"
        );
        Ok(slots)
    }

    /// One slot, or `None` when `start` is not a candidate start for the day.
    pub async fn slot_at(
        &self,
        query: &SlotQuery,
        start: NaiveDateTime,
    ) -> ReservationResult<Option<AvailabilitySlot>> {
        let inventory = self.load_day(query).await?;
        Ok(inventory.accepts(start).then(|| inventory.evaluate(start)))
    }

    /// Load the day view, retrying transient store failures.
    pub async fn load_day(&self, query: &SlotQuery) -> ReservationResult<DayInventory> {
        self.validate(query)?;
        retry_with_backoff(&self.retry, ReservationError::is_retryable, || self.load(query))
            .await
            .map_err(|err| match err {
                ReservationError::Unavailable(reason) => {
                    tracing::warn!(business = %query.business_id, date = %query.date, %reason, "availability unavailable");
                    ReservationError::Unavailable(format!("availability unavailable: {reason}"))
                }
                other => other,
            })
    }

    /// Load the day view with a single attempt. Used inside the reservation lock,
    /// where failures must surface immediately.
    pub async fn load_day_once(&self, query: &SlotQuery) -> ReservationResult<DayInventory> {
        self.validate(query)?;
        self.load(query).await
    }

    async fn load(&self, query: &SlotQuery) -> ReservationResult<DayInventory> {
        let business = self
            .store
            .find_business(&query.business_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("business {}", query.business_id)))?;
        if query.party_size > business.max_party_size {
            return Err(ReservationError::Validation(format!(
                "{} accepts parties of up to {}",
                business.name, business.max_party_size
            )));
        }
        if self.config.reject_past_dates && query.date < business.local_date(self.clock.now()) {
            return Err(ReservationError::Validation(format!(
                "date {} is in the past",
                query.date
            )));
        }
        let duration_minutes = query.duration_minutes.unwrap_or(if business.default_duration_minutes > 0 {
            business.default_duration_minutes
        } else {
            self.config.default_duration_minutes
        });

        let location = query.location_id.as_ref();
        let window = self
            .store
            .operating_window(&business.id, location, query.date.weekday())
            .await?;

        let mut schedules = Vec::new();
        if window.is_some() {
            let day = TimeWindow::day(query.date);
            let resources = self
                .store
                .find_resources(&business.id, location, query.party_size)
                .await?;
            for resource in resources.into_iter().filter(Resource::in_service) {
                let busy = self
                    .store
                    .find_bookings(&resource.id, &day, &BookingStatus::ACTIVE)
                    .await?
                    .iter()
                    .map(crate::core::model::Booking::window)
                    .collect();
                schedules.push(ResourceSchedule { resource, busy });
            }
            schedules.sort_by(|a, b| {
                a.resource
                    .capacity
                    .cmp(&b.resource.capacity)
                    .then_with(|| a.resource.id.cmp(&b.resource.id))
            });
        }

        Ok(DayInventory {
            business,
            window,
            date: query.date,
            party_size: query.party_size,
            duration_minutes,
            schedules,
        })
    }
}
