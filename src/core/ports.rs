//! Collaborator interfaces consumed by the reservation core.
//!
//! Backing implementations are injected as trait objects: the in-memory
//! adapters under [`crate::infra`] for tests and local use, networked ones
//! (relational store, Redis-style cache) in production.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::core::error::ReservationResult;
use crate::core::model::{
    Booking, BookingStatus, Business, NewBooking, OperatingWindow, Resource, ResourceStatus,
    TimeWindow, WaitlistEntry, WaitlistStatus,
};
use crate::util::serde::{
    BookingId, BusinessId, CustomerId, LocationId, LockToken, ResourceId, WaitlistEntryId,
};

/// Transactional store for businesses, resources and bookings.
///
/// Every call must be read-consistent on its own; no cross-call transaction is assumed.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up a business.
    async fn find_business(&self, id: &BusinessId) -> ReservationResult<Option<Business>>;

    /// Opening hours for `weekday`. A location-specific window wins over the
    /// business-wide one. `None` means closed.
    async fn operating_window(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        weekday: Weekday,
    ) -> ReservationResult<Option<OperatingWindow>>;

    /// Resources of the business (optionally one location) with capacity ≥ `min_capacity`.
    async fn find_resources(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        min_capacity: u32,
    ) -> ReservationResult<Vec<Resource>>;

    /// Look up one resource.
    async fn get_resource(&self, id: &ResourceId) -> ReservationResult<Option<Resource>>;

    /// Change a resource's status.
    async fn update_resource_status(
        &self,
        id: &ResourceId,
        status: ResourceStatus,
    ) -> ReservationResult<Resource>;

    /// Bookings on `resource_id` overlapping `range` whose status is in `statuses`.
    async fn find_bookings(
        &self,
        resource_id: &ResourceId,
        range: &TimeWindow,
        statuses: &[BookingStatus],
    ) -> ReservationResult<Vec<Booking>>;

    /// Look up one booking.
    async fn get_booking(&self, id: &BookingId) -> ReservationResult<Option<Booking>>;

    /// Durably create a booking.
    async fn create_booking(&self, booking: NewBooking) -> ReservationResult<Booking>;

    /// Move a booking from `expected` to `status`.
    ///
    /// Returns `Conflict` when the stored status is no longer `expected`.
    async fn update_booking_status(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> ReservationResult<Booking>;
}

/// Store for waitlist entries.
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Entries for (business, location) whose status is in `statuses`, any order.
    async fn waitlist_entries(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        statuses: &[WaitlistStatus],
    ) -> ReservationResult<Vec<WaitlistEntry>>;

    /// WAITING entries of a customer across every location of the business.
    async fn waiting_for_customer(
        &self,
        business_id: &BusinessId,
        customer_id: &CustomerId,
    ) -> ReservationResult<Vec<WaitlistEntry>>;

    /// Look up one entry.
    async fn get_waitlist_entry(
        &self,
        id: &WaitlistEntryId,
    ) -> ReservationResult<Option<WaitlistEntry>>;

    /// Insert a new entry.
    async fn insert_waitlist_entry(&self, entry: WaitlistEntry) -> ReservationResult<WaitlistEntry>;

    /// Overwrite several existing entries atomically.
    async fn update_waitlist_entries(&self, entries: Vec<WaitlistEntry>) -> ReservationResult<()>;

    /// Entries seated at or after `since`.
    async fn seated_since(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        since: DateTime<Utc>,
    ) -> ReservationResult<Vec<WaitlistEntry>>;
}

/// Stream of raw payloads published on a channel.
pub type PayloadStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Shared mutable state: distributed lock, TTL cache and publish/subscribe.
///
/// `acquire` must be an atomic acquire-if-absent with TTL so that several
/// processes can share one backend.
#[async_trait]
pub trait Coordination: Send + Sync {
    /// Try once to take `key` for `ttl`. `None` if someone else holds it.
    async fn acquire(&self, key: &str, ttl: Duration) -> ReservationResult<Option<LockToken>>;

    /// Release `key` if still held with `token`. Returns whether it was released.
    async fn release(&self, key: &str, token: &LockToken) -> ReservationResult<bool>;

    /// Read a cache value.
    async fn get(&self, key: &str) -> ReservationResult<Option<String>>;

    /// Write a cache value with a TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> ReservationResult<()>;

    /// Remove a cache value. Missing keys are fine.
    async fn delete(&self, key: &str) -> ReservationResult<()>;

    /// Publish to a channel, returning the number of receivers reached.
    async fn publish(&self, channel: &str, payload: String) -> ReservationResult<usize>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> ReservationResult<PayloadStream>;
}

/// Template selector for outbound customer messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateKind {
    /// Booking confirmed.
    BookingConfirmed,
    /// Booking cancelled.
    BookingCancelled,
    /// Booking marked as no-show.
    BookingNoShow,
    /// Joined the waitlist.
    WaitlistJoined,
    /// Table is almost ready.
    WaitlistReady,
}

/// Result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Accepted by the channel.
    Delivered,
    /// Failed with a reason.
    Failed(String),
}

/// Outbound message delivery (email/SMS/chat). The message format is the
/// dispatcher's concern.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Send one message.
    async fn send(
        &self,
        customer_id: &CustomerId,
        template: TemplateKind,
        data: serde_json::Value,
    ) -> DeliveryStatus;
}

/// Boxed future handed to a [`Spawn`] implementation.
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Abstraction for spawning detached work on a runtime.
pub trait Spawn: Send + Sync {
    /// Spawn a future that runs to completion in the background.
    fn spawn_boxed(&self, task: BoxedTask);
}

/// Convenience for spawning unboxed futures on a `Spawn` trait object.
pub fn spawn_detached<F>(spawner: &dyn Spawn, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn_boxed(Box::pin(fut));
}
