//! Shared fixtures for integration tests: one business open 09:00-17:00 on
//! Tuesdays with a 30-minute grid, backed by the in-memory adapters.

#![allow(dead_code)]

pub mod yielding;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use reservation_core::builders::{ReservationServices, ServiceBuilder};
use reservation_core::config::ReservationConfig;
use reservation_core::core::model::{
    BookingStatus, Business, NewBooking, OperatingWindow, Resource, ResourceStatus,
};
use reservation_core::core::{ReserveRequest, ResourceStore, SlotQuery};
use reservation_core::infra::{InMemoryCoordination, InMemoryStore, RecordingDispatcher};
use reservation_core::runtime::ReservationApi;
use reservation_core::util::Clock;

pub const BUSINESS: &str = "bistro";
pub const LOCATION: &str = "main";

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub coordination: Arc<InMemoryCoordination>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub services: ReservationServices,
    pub api: ReservationApi,
}

/// A Tuesday well in the future.
pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2031, 3, 4).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

pub fn test_config() -> ReservationConfig {
    let mut config = ReservationConfig::default();
    config.locking.wait_timeout_ms = 10_000;
    config.broadcast.debounce_ms = 100;
    config
}

pub fn fixture() -> Fixture {
    fixture_with(test_config(), None)
}

/// Build services over fresh in-memory adapters. Must run inside a tokio runtime.
pub fn fixture_with(config: ReservationConfig, clock: Option<Arc<dyn Clock>>) -> Fixture {
    reservation_core::util::init_tracing();
    let store = Arc::new(match &clock {
        Some(clock) => InMemoryStore::with_clock(Arc::clone(clock)),
        None => InMemoryStore::new(),
    });
    store.insert_business(Business {
        id: BUSINESS.into(),
        name: "Bistro".into(),
        default_duration_minutes: 60,
        max_party_size: 12,
        utc_offset_minutes: 0,
    });
    store.insert_operating_window(OperatingWindow {
        business_id: BUSINESS.into(),
        location_id: None,
        weekday: Weekday::Tue,
        open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        granularity_minutes: 30,
    });
    let coordination = Arc::new(InMemoryCoordination::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());

    let mut builder = ServiceBuilder::new(config)
        .with_store(Arc::clone(&store))
        .with_coordination(coordination.clone())
        .with_dispatcher(dispatcher.clone());
    if let Some(clock) = clock {
        builder = builder.with_clock(clock);
    }
    let services = builder.build().unwrap();
    let api = ReservationApi::new(services.clone());
    Fixture {
        store,
        coordination,
        dispatcher,
        services,
        api,
    }
}

pub fn add_table(store: &InMemoryStore, id: &str, capacity: u32) {
    store.insert_resource(Resource {
        id: id.into(),
        business_id: BUSINESS.into(),
        location_id: LOCATION.into(),
        name: format!("Table {id}"),
        capacity,
        status: ResourceStatus::Available,
    });
}

/// Write a confirmed booking straight into the store.
pub async fn book_directly(store: &InMemoryStore, resource: &str, start: NaiveDateTime, minutes: u32) {
    store
        .create_booking(NewBooking {
            business_id: BUSINESS.into(),
            location_id: LOCATION.into(),
            resource_id: Some(resource.into()),
            customer_id: "walk-in".into(),
            start,
            duration_minutes: minutes,
            party_size: 2,
            status: BookingStatus::Confirmed,
        })
        .await
        .unwrap();
}

pub fn query(party_size: u32) -> SlotQuery {
    SlotQuery::new(BUSINESS, Some(LOCATION.into()), day(), party_size)
}

pub fn request(customer: &str, start: NaiveDateTime, party_size: u32) -> ReserveRequest {
    ReserveRequest {
        business_id: BUSINESS.into(),
        location_id: LOCATION.into(),
        start,
        party_size,
        duration_minutes: Some(60),
        customer_id: customer.into(),
    }
}

/// Poll until `check` holds; fire-and-forget work lands on other tasks.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check(), "condition not reached in time");
}
