//! In-memory resource and waitlist store.
//!
//! Not durable. Each call takes the table lock once, so every call is
//! read-consistent on its own. Booking inserts reject overlaps on the same
//! resource the way an exclusion constraint would in a relational backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::core::error::{ReservationError, ReservationResult};
use crate::core::model::{
    Booking, BookingStatus, Business, NewBooking, OperatingWindow, Resource, ResourceStatus,
    TimeWindow, WaitlistEntry, WaitlistStatus,
};
use crate::core::ports::{ResourceStore, WaitlistStore};
use crate::util::clock::{Clock, SystemClock};
use crate::util::serde::{
    BookingId, BusinessId, CustomerId, LocationId, ResourceId, WaitlistEntryId,
};

#[derive(Default)]
struct Tables {
    businesses: HashMap<BusinessId, Business>,
    windows: Vec<OperatingWindow>,
    resources: BTreeMap<ResourceId, Resource>,
    bookings: HashMap<BookingId, Booking>,
    waitlist: HashMap<WaitlistEntryId, WaitlistEntry>,
}

/// In-memory store for development and tests.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty store stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            offline: AtomicBool::new(false),
            clock,
        }
    }

    /// Simulate an outage: every call fails with `Unavailable` until restored.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Insert or replace a business.
    pub fn insert_business(&self, business: Business) {
        self.tables.write().businesses.insert(business.id.clone(), business);
    }

    /// Insert an operating window, replacing any window with the same
    /// business, location and weekday.
    pub fn insert_operating_window(&self, window: OperatingWindow) {
        let mut tables = self.tables.write();
        tables.windows.retain(|w| {
            !(w.business_id == window.business_id
                && w.location_id == window.location_id
                && w.weekday == window.weekday)
        });
        tables.windows.push(window);
    }

    /// Insert or replace a resource.
    pub fn insert_resource(&self, resource: Resource) {
        self.tables.write().resources.insert(resource.id.clone(), resource);
    }

    /// Snapshot of every booking, for inspection.
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        let mut all: Vec<_> = self.tables.read().bookings.values().cloned().collect();
        all.sort_by_key(|b| (b.start, b.created_at));
        all
    }

    /// Snapshot of every waitlist entry, for inspection.
    #[must_use]
    pub fn waitlist(&self) -> Vec<WaitlistEntry> {
        self.tables.read().waitlist.values().cloned().collect()
    }

    fn online(&self) -> ReservationResult<()> {
        if self.offline.load(Ordering::Acquire) {
            return Err(ReservationError::Unavailable("store offline".into()));
        }
        Ok(())
    }
}

fn in_scope(
    business_id: &BusinessId,
    location_id: Option<&LocationId>,
    entry: &WaitlistEntry,
) -> bool {
    &entry.business_id == business_id && entry.location_id.as_ref() == location_id
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn find_business(&self, id: &BusinessId) -> ReservationResult<Option<Business>> {
        self.online()?;
        Ok(self.tables.read().businesses.get(id).cloned())
    }

    async fn operating_window(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        weekday: Weekday,
    ) -> ReservationResult<Option<OperatingWindow>> {
        self.online()?;
        let tables = self.tables.read();
        let matching = |loc: Option<&LocationId>| {
            tables
                .windows
                .iter()
                .find(|w| {
                    &w.business_id == business_id
                        && w.weekday == weekday
                        && w.location_id.as_ref() == loc
                })
                .cloned()
        };
        Ok(location_id
            .and_then(|loc| matching(Some(loc)))
            .or_else(|| matching(None)))
    }

    async fn find_resources(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        min_capacity: u32,
    ) -> ReservationResult<Vec<Resource>> {
        self.online()?;
        Ok(self
            .tables
            .read()
            .resources
            .values()
            .filter(|r| &r.business_id == business_id)
            .filter(|r| location_id.is_none_or(|loc| &r.location_id == loc))
            .filter(|r| r.capacity >= min_capacity)
            .cloned()
            .collect())
    }

    async fn get_resource(&self, id: &ResourceId) -> ReservationResult<Option<Resource>> {
        self.online()?;
        Ok(self.tables.read().resources.get(id).cloned())
    }

    async fn update_resource_status(
        &self,
        id: &ResourceId,
        status: ResourceStatus,
    ) -> ReservationResult<Resource> {
        self.online()?;
        let mut tables = self.tables.write();
        let resource = tables
            .resources
            .get_mut(id)
            .ok_or_else(|| ReservationError::NotFound(format!("resource {id}")))?;
        resource.status = status;
        Ok(resource.clone())
    }

    async fn find_bookings(
        &self,
        resource_id: &ResourceId,
        range: &TimeWindow,
        statuses: &[BookingStatus],
    ) -> ReservationResult<Vec<Booking>> {
        self.online()?;
        let mut found: Vec<Booking> = self
            .tables
            .read()
            .bookings
            .values()
            .filter(|b| b.resource_id.as_ref() == Some(resource_id))
            .filter(|b| statuses.contains(&b.status))
            .filter(|b| b.window().overlaps(range))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start);
        Ok(found)
    }

    async fn get_booking(&self, id: &BookingId) -> ReservationResult<Option<Booking>> {
        self.online()?;
        Ok(self.tables.read().bookings.get(id).cloned())
    }

    async fn create_booking(&self, booking: NewBooking) -> ReservationResult<Booking> {
        self.online()?;
        let mut tables = self.tables.write();
        if !tables.businesses.contains_key(&booking.business_id) {
            return Err(ReservationError::NotFound(format!(
                "business {}",
                booking.business_id
            )));
        }
        let created = Booking {
            id: Uuid::new_v4(),
            business_id: booking.business_id,
            location_id: booking.location_id,
            resource_id: booking.resource_id,
            customer_id: booking.customer_id,
            start: booking.start,
            duration_minutes: booking.duration_minutes,
            party_size: booking.party_size,
            status: booking.status,
            created_at: self.clock.now(),
        };
        if let Some(resource_id) = &created.resource_id {
            if !tables.resources.contains_key(resource_id) {
                return Err(ReservationError::NotFound(format!("resource {resource_id}")));
            }
            if created.status.is_active() {
                let window = created.window();
                let clash = tables.bookings.values().any(|b| {
                    b.resource_id.as_ref() == Some(resource_id)
                        && b.status.is_active()
                        && b.window().overlaps(&window)
                });
                if clash {
                    return Err(ReservationError::Conflict(format!(
                        "resource {resource_id} already booked in {} - {}",
                        window.start, window.end
                    )));
                }
            }
        }
        tables.bookings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_booking_status(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> ReservationResult<Booking> {
        self.online()?;
        let mut tables = self.tables.write();
        let booking = tables
            .bookings
            .get_mut(id)
            .ok_or_else(|| ReservationError::NotFound(format!("booking {id}")))?;
        if booking.status != expected {
            return Err(ReservationError::Conflict(format!(
                "booking {id} is {:?}, expected {expected:?}",
                booking.status
            )));
        }
        booking.status = status;
        Ok(booking.clone())
    }
}

#[async_trait]
impl WaitlistStore for InMemoryStore {
    async fn waitlist_entries(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        statuses: &[WaitlistStatus],
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        self.online()?;
        Ok(self
            .tables
            .read()
            .waitlist
            .values()
            .filter(|e| in_scope(business_id, location_id, e))
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect())
    }

    async fn waiting_for_customer(
        &self,
        business_id: &BusinessId,
        customer_id: &CustomerId,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        self.online()?;
        Ok(self
            .tables
            .read()
            .waitlist
            .values()
            .filter(|e| &e.business_id == business_id && &e.customer_id == customer_id)
            .filter(|e| e.status == WaitlistStatus::Waiting)
            .cloned()
            .collect())
    }

    async fn get_waitlist_entry(
        &self,
        id: &WaitlistEntryId,
    ) -> ReservationResult<Option<WaitlistEntry>> {
        self.online()?;
        Ok(self.tables.read().waitlist.get(id).cloned())
    }

    async fn insert_waitlist_entry(&self, entry: WaitlistEntry) -> ReservationResult<WaitlistEntry> {
        self.online()?;
        let mut tables = self.tables.write();
        if tables.waitlist.contains_key(&entry.id) {
            return Err(ReservationError::Conflict(format!(
                "waitlist entry {} exists",
                entry.id
            )));
        }
        tables.waitlist.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update_waitlist_entries(&self, entries: Vec<WaitlistEntry>) -> ReservationResult<()> {
        self.online()?;
        let mut tables = self.tables.write();
        if let Some(missing) = entries.iter().find(|e| !tables.waitlist.contains_key(&e.id)) {
            return Err(ReservationError::NotFound(format!(
                "waitlist entry {}",
                missing.id
            )));
        }
        for entry in entries {
            tables.waitlist.insert(entry.id, entry);
        }
        Ok(())
    }

    async fn seated_since(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        since: DateTime<Utc>,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        self.online()?;
        Ok(self
            .tables
            .read()
            .waitlist
            .values()
            .filter(|e| in_scope(business_id, location_id, e))
            .filter(|e| e.status == WaitlistStatus::Seated)
            .filter(|e| e.seated_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }
}
