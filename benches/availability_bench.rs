//! Benchmarks for the reservation core.
//!
//! Benchmarks cover:
//! - Day availability over growing table counts
//! - Reservation decision plus hold release
//! - Waitlist join and removal with renumbering

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use reservation_core::builders::{ReservationServices, ServiceBuilder};
use reservation_core::config::ReservationConfig;
use reservation_core::core::model::{
    BookingStatus, Business, NewBooking, OperatingWindow, Resource, ResourceStatus,
};
use reservation_core::core::{
    JoinRequest, RemovalReason, ReserveRequest, ResourceStore, SlotQuery, SlotRelease,
};
use reservation_core::infra::{InMemoryStore, RecordingDispatcher};
use tokio::runtime::Runtime;

const BUSINESS: &str = "bench";
const LOCATION: &str = "floor";

fn day() -> NaiveDate {
    // A Tuesday.
    NaiveDate::from_ymd_opt(2031, 3, 4).unwrap_or_default()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default())
}

fn seeded(rt: &Runtime, tables: u32) -> ReservationServices {
    let store = Arc::new(InMemoryStore::new());
    store.insert_business(Business {
        id: BUSINESS.into(),
        name: "Bench".into(),
        default_duration_minutes: 90,
        max_party_size: 12,
        utc_offset_minutes: 0,
    });
    store.insert_operating_window(OperatingWindow {
        business_id: BUSINESS.into(),
        location_id: None,
        weekday: Weekday::Tue,
        open: NaiveTime::from_hms_opt(11, 0, 0).unwrap_or_default(),
        close: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
        granularity_minutes: 15,
    });
    rt.block_on(async {
        for i in 0..tables {
            let id = format!("t{i:03}");
            store.insert_resource(Resource {
                id: id.clone(),
                business_id: BUSINESS.into(),
                location_id: LOCATION.into(),
                name: id.clone(),
                capacity: 2 + (i % 4) * 2,
                status: ResourceStatus::Available,
            });
            // Two sittings per table, staggered.
            for start in [at(12, (i % 4) * 15), at(19, (i % 4) * 15)] {
                let _ = store
                    .create_booking(NewBooking {
                        business_id: BUSINESS.into(),
                        location_id: LOCATION.into(),
                        resource_id: Some(id.clone()),
                        customer_id: format!("c{i}"),
                        start,
                        duration_minutes: 90,
                        party_size: 2,
                        status: BookingStatus::Confirmed,
                    })
                    .await;
            }
        }
    });
    let _guard = rt.enter();
    ServiceBuilder::new(ReservationConfig::default())
        .with_store(store)
        .with_dispatcher(Arc::new(RecordingDispatcher::new()))
        .build()
        .unwrap_or_else(|err| panic!("bench services: {err}"))
}

// ============================================================================
// Availability
// ============================================================================

fn bench_day_availability(c: &mut Criterion) {
    let mut group = c.benchmark_group("day_availability");
    let rt = Runtime::new().unwrap_or_else(|err| panic!("runtime: {err}"));

    for tables in [4_u32, 16, 64] {
        let services = seeded(&rt, tables);
        let query = SlotQuery::new(BUSINESS, Some(LOCATION.into()), day(), 2);
        group.throughput(Throughput::Elements(u64::from(tables)));
        group.bench_with_input(BenchmarkId::from_parameter(tables), &tables, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(services.calculator.available_slots(&query).await.ok());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Reservation decision
// ============================================================================

fn bench_reserve_and_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_and_release");
    let rt = Runtime::new().unwrap_or_else(|err| panic!("runtime: {err}"));
    let services = seeded(&rt, 16);
    let request = ReserveRequest {
        business_id: BUSINESS.into(),
        location_id: LOCATION.into(),
        start: at(15, 0),
        party_size: 4,
        duration_minutes: None,
        customer_id: "bench-guest".into(),
    };

    group.bench_function("decision_with_hold", |b| {
        b.to_async(&rt).iter(|| async {
            let outcome = services.coordinator.reserve_slot(&request).await.ok();
            if let Some(hold) = outcome.as_ref().and_then(|o| o.hold()) {
                let release = SlotRelease {
                    business_id: hold.business_id.clone(),
                    location_id: hold.location_id.clone(),
                    resource_id: hold.resource_id.clone(),
                    window: hold.window,
                };
                black_box(services.coordinator.release_slot(&release).await.ok());
            }
        });
    });
    group.finish();
}

// ============================================================================
// Waitlist
// ============================================================================

fn bench_waitlist_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("waitlist_churn");
    let rt = Runtime::new().unwrap_or_else(|err| panic!("runtime: {err}"));

    for depth in [10_u32, 100] {
        let services = seeded(&rt, 1);
        rt.block_on(async {
            for i in 0..depth {
                let _ = services
                    .waitlist
                    .join(JoinRequest {
                        business_id: BUSINESS.into(),
                        location_id: Some(LOCATION.into()),
                        customer_id: format!("queued-{i}"),
                        party_size: 2,
                        display_name: None,
                        notes: None,
                    })
                    .await;
            }
        });
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.to_async(&rt).iter(|| async {
                let joined = services
                    .waitlist
                    .join(JoinRequest {
                        business_id: BUSINESS.into(),
                        location_id: Some(LOCATION.into()),
                        customer_id: "churn".into(),
                        party_size: 2,
                        display_name: None,
                        notes: None,
                    })
                    .await;
                if let Ok(entry) = joined {
                    black_box(services.waitlist.remove(&entry.id, RemovalReason::Left).await.ok());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_day_availability,
    bench_reserve_and_release,
    bench_waitlist_churn
);
criterion_main!(benches);
