//! Configuration models for slots, locking, broadcast, waitlist and retries.

pub mod reservation;

pub use reservation::{
    BroadcastConfig, LockConfig, ReservationConfig, RetryConfig, SlotConfig, WaitlistConfig,
};
