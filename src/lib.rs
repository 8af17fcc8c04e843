//! # Reservation Core
//!
//! Reservation engine for service businesses (restaurants, salons, pet shops)
//! that book a finite set of physical resources such as tables or rooms.
//!
//! ## Components
//!
//! - **Slot Availability Calculator** ([`core::AvailabilityCalculator`]): derives
//!   bookable start times for a day from operating hours, resource capacities
//!   and existing bookings. Always recomputed from current state.
//! - **Reservation Coordinator** ([`core::ReservationCoordinator`]): grants at
//!   most one reservation per contested resource and window. Decisions run under
//!   a short-TTL lock; the winner gets a pending hold that bridges the gap to the
//!   durable booking write.
//! - **Availability Broadcast Layer** ([`core::AvailabilityBroadcaster`]):
//!   coalesces bursts of changes behind a debounced timer and fans the latest
//!   slot list out to live viewers.
//! - **Waitlist Queue Manager** ([`core::WaitlistManager`]): walk-in queues whose
//!   WAITING positions are always exactly `1..=k`.
//! - **Booking lifecycle** ([`core::BookingService`]): turns holds into bookings
//!   and drives their status machine.
//!
//! Storage, the lock/cache/pub-sub backend and message delivery are injected
//! collaborators (see [`core::ports`]); in-memory adapters live in [`infra`].
//!
//! ```rust,ignore
//! use reservation_core::builders::ServiceBuilder;
//! use reservation_core::config::ReservationConfig;
//! use reservation_core::runtime::ReservationApi;
//!
//! let services = ServiceBuilder::new(ReservationConfig::from_env()?)
//!     .with_store(store)
//!     .build()?;
//! services.start();
//! let api = ReservationApi::new(services.clone());
//! let slots = api.get_availability(&query).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Reservation core: availability, coordination, broadcast, waitlist and bookings.
pub mod core;
/// Configuration models for slots, locking, broadcast, waitlist and retries.
pub mod config;
/// Builders to construct the service graph from configuration.
pub mod builders;
/// Infrastructure adapters for stores, coordination and notification dispatch.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
