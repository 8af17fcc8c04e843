//! Tests for builder modules

use std::sync::Arc;

use reservation_core::builders::ServiceBuilder;
use reservation_core::config::ReservationConfig;
use reservation_core::runtime::TokioSpawner;

#[test]
fn test_builder_keeps_config() {
    let mut config = ReservationConfig::default();
    config.locking.max_alternatives = 5;
    let builder = ServiceBuilder::new(config.clone());
    assert_eq!(builder.config(), &config);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = ReservationConfig::default();
    config.broadcast.refresh_interval_secs = 0;
    let err = ServiceBuilder::new(config).build().err().unwrap();
    assert!(err.to_string().contains("config invalid"));
}

#[test]
fn test_build_outside_runtime_needs_a_spawner() {
    let err = ServiceBuilder::new(ReservationConfig::default())
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("tokio runtime"));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let services = ServiceBuilder::new(ReservationConfig::default())
        .with_spawner(Arc::new(TokioSpawner::new(runtime.handle().clone())))
        .build()
        .unwrap();
    assert_eq!(services.config, ReservationConfig::default());
}

#[tokio::test]
async fn test_build_defaults_to_in_memory_adapters() {
    let services = ServiceBuilder::new(ReservationConfig::default()).build().unwrap();
    services.start();
    services.start();
    services.shutdown();
}
