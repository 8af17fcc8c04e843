//! API-facing request/response models and the produced operation surface.
//!
//! Transport-agnostic: an HTTP or RPC layer maps these onto its own routing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::builders::ReservationServices;
use crate::core::{
    AvailabilitySubscription, BookOutcome, ErrorKind, JoinRequest, RemovalReason,
    ReservationError, ReserveRequest, SlotConflict, SlotQuery, SlotRelease, WaitlistPosition,
    WaitlistStats,
};
use crate::core::model::{AvailabilitySlot, Booking, WaitlistEntry};
use crate::util::serde::{
    BookingId, BusinessId, LocationId, ResourceId, SubscriptionId, WaitlistEntryId,
};

/// Error returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Category.
    pub kind: ErrorKind,
    /// Caller-safe message.
    pub message: String,
    /// Whether retrying the same request may succeed.
    pub retryable: bool,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn from_error(operation: &'static str, err: &ReservationError) -> Self {
        match err {
            ReservationError::Internal(detail) => {
                tracing::error!(operation, %detail, "internal failure");
            }
            ReservationError::Unavailable(reason) => {
                tracing::warn!(operation, %reason, "backend unavailable");
            }
            other => tracing::debug!(operation, error = %other, "request rejected"),
        }
        Self {
            kind: err.kind(),
            message: err.public_message(),
            retryable: err.is_retryable(),
        }
    }
}

/// API result alias.
pub type ApiResult<T> = Result<T, ApiError>;

/// Reserve response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveResponse {
    /// Whether a booking was written.
    pub confirmed: bool,
    /// Assigned resource.
    pub resource_id: Option<ResourceId>,
    /// Created booking.
    pub booking_id: Option<BookingId>,
    /// Why the slot was refused, with alternatives.
    pub conflicts: Vec<SlotConflict>,
}

/// Release response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseResponse {
    /// Whether a pending hold was cleared. `false` on repeated calls.
    pub released: bool,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Coordination backend reachable.
    pub coordination: bool,
}

/// Operation surface consumed by a UI or API layer.
#[derive(Clone)]
pub struct ReservationApi {
    services: ReservationServices,
}

impl ReservationApi {
    /// Wrap built services.
    #[must_use]
    pub const fn new(services: ReservationServices) -> Self {
        Self { services }
    }

    /// Underlying services.
    #[must_use]
    pub const fn services(&self) -> &ReservationServices {
        &self.services
    }

    /// Bookable slots for a day.
    pub async fn get_availability(&self, query: &SlotQuery) -> ApiResult<Vec<AvailabilitySlot>> {
        self.services
            .calculator
            .available_slots(query)
            .await
            .map_err(|e| ApiError::from_error("get_availability", &e))
    }

    /// Reserve and book a slot.
    pub async fn reserve(&self, request: &ReserveRequest) -> ApiResult<ReserveResponse> {
        let outcome = self
            .services
            .bookings
            .book(request)
            .await
            .map_err(|e| ApiError::from_error("reserve", &e))?;
        Ok(match outcome {
            BookOutcome::Booked(booking) => ReserveResponse {
                confirmed: true,
                resource_id: booking.resource_id,
                booking_id: Some(booking.id),
                conflicts: Vec::new(),
            },
            BookOutcome::Conflict(conflict) => ReserveResponse {
                confirmed: false,
                resource_id: None,
                booking_id: None,
                conflicts: vec![conflict],
            },
        })
    }

    /// Clear a pending hold. Idempotent.
    pub async fn release(&self, release: &SlotRelease) -> ApiResult<ReleaseResponse> {
        self.services
            .coordinator
            .release_slot(release)
            .await
            .map(|released| ReleaseResponse { released })
            .map_err(|e| ApiError::from_error("release", &e))
    }

    /// Cancel a booking.
    pub async fn cancel_booking(&self, id: &BookingId) -> ApiResult<Booking> {
        self.services
            .bookings
            .cancel(id)
            .await
            .map_err(|e| ApiError::from_error("cancel_booking", &e))
    }

    /// Join a waitlist.
    pub async fn join(&self, request: JoinRequest) -> ApiResult<WaitlistEntry> {
        self.services
            .waitlist
            .join(request)
            .await
            .map_err(|e| ApiError::from_error("waitlist_join", &e))
    }

    /// Leave a waitlist, seated or not.
    pub async fn leave(
        &self,
        entry_id: &WaitlistEntryId,
        reason: RemovalReason,
    ) -> ApiResult<WaitlistEntry> {
        self.services
            .waitlist
            .remove(entry_id, reason)
            .await
            .map_err(|e| ApiError::from_error("waitlist_leave", &e))
    }

    /// Where an entry stands.
    pub async fn position(&self, entry_id: &WaitlistEntryId) -> ApiResult<WaitlistPosition> {
        self.services
            .waitlist
            .position(entry_id)
            .await
            .map_err(|e| ApiError::from_error("waitlist_position", &e))
    }

    /// Notify the next `count` waiting parties.
    pub async fn notify_next(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        count: usize,
    ) -> ApiResult<Vec<WaitlistEntry>> {
        self.services
            .waitlist
            .notify_next(business_id, location_id, count)
            .await
            .map_err(|e| ApiError::from_error("waitlist_notify_next", &e))
    }

    /// Queue summary.
    pub async fn stats(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
    ) -> ApiResult<WaitlistStats> {
        self.services
            .waitlist
            .stats(business_id, location_id)
            .await
            .map_err(|e| ApiError::from_error("waitlist_stats", &e))
    }

    /// Watch availability for a day.
    pub async fn subscribe(
        &self,
        business_id: &BusinessId,
        location_id: Option<&LocationId>,
        date: NaiveDate,
    ) -> ApiResult<AvailabilitySubscription> {
        self.services
            .broadcaster
            .subscribe(business_id, location_id, date)
            .await
            .map_err(|e| ApiError::from_error("subscribe", &e))
    }

    /// Stop watching.
    #[must_use]
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.services.broadcaster.unsubscribe(id)
    }

    /// Probe the coordination backend.
    pub async fn health(&self) -> Health {
        let coordination = match self.services.coordination.get("health:probe").await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "coordination health probe failed");
                false
            }
        };
        Health {
            ok: coordination,
            coordination,
        }
    }
}
