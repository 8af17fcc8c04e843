//! Runtime adapters and the produced API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{ApiError, ApiResult, Health, ReleaseResponse, ReservationApi, ReserveResponse};
pub use tokio_spawner::TokioSpawner;
