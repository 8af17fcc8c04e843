//! Builders to construct reservation services from configuration.

pub mod service_builder;

pub use service_builder::{ReservationServices, ServiceBuilder};
