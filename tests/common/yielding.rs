//! Store wrapper that yields to the scheduler after selected reads, so two
//! joined futures interleave between their read and their write. The seated
//! history read can also be switched off on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use reservation_core::core::model::{
    Booking, BookingStatus, Business, NewBooking, OperatingWindow, Resource, ResourceStatus,
    TimeWindow, WaitlistEntry, WaitlistStatus,
};
use reservation_core::core::{ReservationError, ReservationResult, ResourceStore, WaitlistStore};
use reservation_core::infra::InMemoryStore;
use reservation_core::util::{
    BookingId, BusinessId, CustomerId, LocationId, ResourceId, WaitlistEntryId,
};

pub struct YieldingStore {
    inner: Arc<InMemoryStore>,
    history_offline: AtomicBool,
}

impl YieldingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            history_offline: AtomicBool::new(false),
        })
    }

    pub fn set_history_offline(&self, offline: bool) {
        self.history_offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for YieldingStore {
    async fn find_business(&self, id: &BusinessId) -> ReservationResult<Option<Business>> {
        self.inner.find_business(id).await
    }

    async fn operating_window(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        weekday: Weekday,
    ) -> ReservationResult<Option<OperatingWindow>> {
        self.inner.operating_window(business_id, location_id, weekday).await
    }

    async fn find_resources(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        min_capacity: u32,
    ) -> ReservationResult<Vec<Resource>> {
        self.inner.find_resources(business_id, location_id, min_capacity).await
    }

    async fn get_resource(&self, id: &ResourceId) -> ReservationResult<Option<Resource>> {
        self.inner.get_resource(id).await
    }

    async fn update_resource_status(
        &self,
        id: &ResourceId,
        status: ResourceStatus,
    ) -> ReservationResult<Resource> {
        self.inner.update_resource_status(id, status).await
    }

    async fn find_bookings(
        &self,
        resource_id: &ResourceId,
        range: &TimeWindow,
        statuses: &[BookingStatus],
    ) -> ReservationResult<Vec<Booking>> {
        self.inner.find_bookings(resource_id, range, statuses).await
    }

    async fn get_booking(&self, id: &BookingId) -> ReservationResult<Option<Booking>> {
        let booking = self.inner.get_booking(id).await;
        tokio::task::yield_now().await;
        booking
    }

    async fn create_booking(&self, booking: NewBooking) -> ReservationResult<Booking> {
        self.inner.create_booking(booking).await
    }

    async fn update_booking_status(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> ReservationResult<Booking> {
        self.inner.update_booking_status(id, expected, status).await
    }
}

#[async_trait]
impl WaitlistStore for YieldingStore {
    async fn waitlist_entries(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        statuses: &[WaitlistStatus],
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        self.inner.waitlist_entries(business_id, location_id, statuses).await
    }

    async fn waiting_for_customer(
        &self,
        business_id: &BusinessId,
        customer_id: &CustomerId,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        let waiting = self.inner.waiting_for_customer(business_id, customer_id).await;
        tokio::task::yield_now().await;
        waiting
    }

    async fn get_waitlist_entry(
        &self,
        id: &WaitlistEntryId,
    ) -> ReservationResult<Option<WaitlistEntry>> {
        self.inner.get_waitlist_entry(id).await
    }

    async fn insert_waitlist_entry(&self, entry: WaitlistEntry) -> ReservationResult<WaitlistEntry> {
        self.inner.insert_waitlist_entry(entry).await
    }

    async fn update_waitlist_entries(&self, entries: Vec<WaitlistEntry>) -> ReservationResult<()> {
        self.inner.update_waitlist_entries(entries).await
    }

    async fn seated_since(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        since: DateTime<Utc>,
    ) -> ReservationResult<Vec<WaitlistEntry>> {
        if self.history_offline.load(Ordering::SeqCst) {
            return Err(ReservationError::Unavailable("history replica down".into()));
        }
        self.inner.seated_since(business_id, location_id, since).await
    }
}
