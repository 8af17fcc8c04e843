//! Reservation core: availability, coordination, broadcast, waitlist and booking lifecycle.

pub mod availability;
pub mod booking;
pub mod broadcast;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod model;
pub mod notify;
pub mod ports;
pub mod waitlist;

pub use availability::{AvailabilityCalculator, DayInventory, SlotQuery};
pub use booking::{BookOutcome, BookingService};
pub use broadcast::{
    AvailabilityBroadcaster, AvailabilityChanged, AvailabilitySubscription, BroadcastKey,
    ChangeType,
};
pub use coordinator::{
    pending_key, reservation_lock_key, ConflictReason, PendingReservation,
    ReservationCoordinator, ReserveOutcome, ReserveRequest, SlotConflict, SlotRelease,
};
pub use error::{AppResult, ErrorKind, ReservationError, ReservationResult};
pub use lock::KeyedLock;
pub use notify::Notifier;
pub use ports::{
    spawn_detached, BoxedTask, Coordination, DeliveryStatus, NotificationDispatcher,
    PayloadStream, ResourceStore, Spawn, TemplateKind, WaitlistStore,
};
pub use waitlist::{
    waitlist_customer_lock_key, waitlist_lock_key, JoinRequest, RemovalReason, WaitlistManager,
    WaitlistPosition,
    WaitlistStats,
};
