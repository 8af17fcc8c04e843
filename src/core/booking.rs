//! Booking lifecycle on top of the reservation coordinator.
//!
//! `book` turns a held slot into a durable booking. Status transitions follow
//! [`BookingStatus::can_transition_to`]; terminal ones give the slot back and
//! every change is fanned out to live viewers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::broadcast::{AvailabilityBroadcaster, ChangeType};
use crate::core::coordinator::{
    ReservationCoordinator, ReserveOutcome, ReserveRequest, SlotConflict, SlotRelease,
};
use crate::core::error::{ReservationError, ReservationResult};
use crate::core::model::{Booking, BookingStatus, NewBooking, Resource, ResourceStatus};
use crate::core::notify::Notifier;
use crate::core::ports::{ResourceStore, TemplateKind};
use crate::util::serde::{BookingId, ResourceId};

/// Result of a booking attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookOutcome {
    /// Durable booking written.
    Booked(Booking),
    /// Slot refused.
    Conflict(SlotConflict),
}

/// Creates bookings and drives their status machine.
pub struct BookingService {
    store: Arc<dyn ResourceStore>,
    coordinator: Arc<ReservationCoordinator>,
    broadcaster: AvailabilityBroadcaster,
    notifier: Notifier,
}

impl BookingService {
    /// Build the service.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        coordinator: Arc<ReservationCoordinator>,
        broadcaster: AvailabilityBroadcaster,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            coordinator,
            broadcaster,
            notifier,
        }
    }

    /// Reserve and durably book. The hold is dropped whether the write succeeds or not.
    pub async fn book(&self, request: &ReserveRequest) -> ReservationResult<BookOutcome> {
        let hold = match self.coordinator.reserve_slot(request).await? {
            ReserveOutcome::Reserved(hold) => hold,
            ReserveOutcome::Conflict(conflict) => return Ok(BookOutcome::Conflict(conflict)),
        };

        let duration_minutes =
            u32::try_from((hold.window.end - hold.window.start).num_minutes()).unwrap_or(0);
        let created = self
            .store
            .create_booking(NewBooking {
                business_id: hold.business_id.clone(),
                location_id: hold.location_id.clone(),
                resource_id: Some(hold.resource_id.clone()),
                customer_id: hold.customer_id.clone(),
                start: hold.window.start,
                duration_minutes,
                party_size: hold.party_size,
                status: BookingStatus::Confirmed,
            })
            .await;
        let release = SlotRelease {
            business_id: hold.business_id.clone(),
            location_id: hold.location_id.clone(),
            resource_id: hold.resource_id.clone(),
            window: hold.window,
        };
        self.release_quietly(&release).await;

        let booking = match created {
            Ok(booking) => booking,
            Err(err) => {
                tracing::warn!(
                    business = %hold.business_id,
                    resource = %hold.resource_id,
                    start = %hold.window.start,
                    error = %err,
                    "booking write failed, hold released"
                );
                return Err(err);
            }
        };

        tracing::info!(
            booking = %booking.id,
            business = %booking.business_id,
            location = %booking.location_id,
            resource = %hold.resource_id,
            start = %booking.start,
            "booking confirmed"
        );
        self.broadcaster
            .notify(
                &booking.business_id,
                Some(&booking.location_id),
                booking.start.date(),
                ChangeType::BookingCreated,
            )
            .await;
        self.notifier.notify(
            &booking.customer_id,
            TemplateKind::BookingConfirmed,
            json!({
                "booking_id": booking.id,
                "start": booking.start,
                "duration_minutes": booking.duration_minutes,
                "party_size": booking.party_size,
                "resource_id": booking.resource_id,
            }),
        );
        Ok(BookOutcome::Booked(booking))
    }

    /// Look up a booking.
    pub async fn get(&self, id: &BookingId) -> ReservationResult<Booking> {
        self.store
            .get_booking(id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("booking {id}")))
    }

    /// PENDING → CONFIRMED.
    pub async fn confirm(&self, id: &BookingId) -> ReservationResult<Booking> {
        self.transition(id, BookingStatus::Confirmed).await
    }

    /// CONFIRMED → CHECKED_IN.
    pub async fn check_in(&self, id: &BookingId) -> ReservationResult<Booking> {
        self.transition(id, BookingStatus::CheckedIn).await
    }

    /// Seat the party; the resource becomes OCCUPIED.
    pub async fn seat(&self, id: &BookingId) -> ReservationResult<Booking> {
        self.transition(id, BookingStatus::Seated).await
    }

    /// SEATED → COMPLETED.
    pub async fn complete(&self, id: &BookingId) -> ReservationResult<Booking> {
        self.transition(id, BookingStatus::Completed).await
    }

    /// Cancel a non-terminal booking.
    pub async fn cancel(&self, id: &BookingId) -> ReservationResult<Booking> {
        self.transition(id, BookingStatus::Cancelled).await
    }

    /// Mark a pending or confirmed booking as a no-show.
    pub async fn mark_no_show(&self, id: &BookingId) -> ReservationResult<Booking> {
        self.transition(id, BookingStatus::NoShow).await
    }

    /// Staff edit of a resource's status.
    pub async fn set_resource_status(
        &self,
        resource_id: &ResourceId,
        status: ResourceStatus,
    ) -> ReservationResult<Resource> {
        let resource = self.store.update_resource_status(resource_id, status).await?;
        tracing::info!(resource = %resource.id, ?status, "resource status changed");
        self.broadcaster
            .notify_all_dates(
                &resource.business_id,
                &resource.location_id,
                ChangeType::TableStatusChanged,
            )
            .await;
        Ok(resource)
    }

    async fn transition(&self, id: &BookingId, next: BookingStatus) -> ReservationResult<Booking> {
        let current = self.get(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(ReservationError::Conflict(format!(
                "booking {id} cannot move from {:?} to {next:?}",
                current.status
            )));
        }
        let booking = self
            .store
            .update_booking_status(id, current.status, next)
            .await?;
        tracing::info!(booking = %id, from = ?current.status, to = ?next, "booking status changed");

        if let Some(resource_id) = booking.resource_id.as_ref() {
            if next == BookingStatus::Seated {
                self.set_resource_quietly(resource_id, ResourceStatus::Occupied).await;
            }
            if next.is_terminal() {
                self.free_resource(&booking, resource_id).await;
            }
        }

        let change = match next {
            BookingStatus::Cancelled | BookingStatus::NoShow => ChangeType::BookingCancelled,
            _ => ChangeType::BookingUpdated,
        };
        self.broadcaster
            .notify(
                &booking.business_id,
                Some(&booking.location_id),
                booking.start.date(),
                change,
            )
            .await;

        let template = match next {
            BookingStatus::Cancelled => Some(TemplateKind::BookingCancelled),
            BookingStatus::NoShow => Some(TemplateKind::BookingNoShow),
            _ => None,
        };
        if let Some(template) = template {
            self.notifier.notify(
                &booking.customer_id,
                template,
                json!({ "booking_id": booking.id, "start": booking.start }),
            );
        }
        Ok(booking)
    }

    async fn free_resource(&self, booking: &Booking, resource_id: &ResourceId) {
        self.release_quietly(&SlotRelease {
            business_id: booking.business_id.clone(),
            location_id: booking.location_id.clone(),
            resource_id: resource_id.clone(),
            window: booking.window(),
        })
        .await;
        match self.store.get_resource(resource_id).await {
            Ok(Some(resource)) if resource.status == ResourceStatus::Occupied => {
                self.set_resource_quietly(resource_id, ResourceStatus::Available).await;
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(resource = %resource_id, error = %err, "resource lookup failed"),
        }
    }

    async fn release_quietly(&self, release: &SlotRelease) {
        if let Err(err) = self.coordinator.release_slot(release).await {
            tracing::warn!(resource = %release.resource_id, error = %err, "hold release failed, ttl will reclaim it");
        }
    }

    async fn set_resource_quietly(&self, resource_id: &ResourceId, status: ResourceStatus) {
        if let Err(err) = self.store.update_resource_status(resource_id, status).await {
            tracing::warn!(resource = %resource_id, ?status, error = %err, "resource status update failed");
        }
    }
}
