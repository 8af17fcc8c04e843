//! Tests for configuration validation and loading

use std::collections::HashMap;

use reservation_core::config::ReservationConfig;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let config = ReservationConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.slots.default_duration_minutes, 90);
    assert_eq!(config.broadcast.debounce_ms, 250);
    assert_eq!(config.waitlist.fallback_wait_minutes, 20);
    assert_eq!(config.waitlist.history_days, 7);
}

#[test]
fn test_zero_party_size_is_invalid() {
    let mut config = ReservationConfig::default();
    config.slots.max_party_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_max_duration_below_default_is_invalid() {
    let mut config = ReservationConfig::default();
    config.slots.max_duration_minutes = 30;
    assert!(config.validate().is_err());
}

#[test]
fn test_poll_bounds_are_checked() {
    let mut config = ReservationConfig::default();
    config.locking.poll_initial_ms = 100;
    config.locking.poll_max_ms = 10;
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_debounce_is_invalid() {
    let mut config = ReservationConfig::default();
    config.broadcast.debounce_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_from_json_fills_missing_sections() {
    let json = r#"{
        "slots": { "default_duration_minutes": 60 },
        "locking": { "wait_timeout_ms": 500 }
    }"#;
    let config = ReservationConfig::from_json_str(json).unwrap();
    assert_eq!(config.slots.default_duration_minutes, 60);
    assert_eq!(config.slots.max_party_size, 50);
    assert_eq!(config.locking.wait_timeout_ms, 500);
    assert_eq!(config.locking.lock_ttl_ms, 5_000);
    assert_eq!(config.broadcast, ReservationConfig::default().broadcast);
}

#[test]
fn test_from_json_rejects_invalid_values() {
    let json = r#"{ "waitlist": { "history_days": 0 } }"#;
    assert!(ReservationConfig::from_json_str(json).is_err());
    assert!(ReservationConfig::from_json_str("not json").is_err());
}

#[test]
fn test_env_overrides() {
    let mut config = ReservationConfig::default();
    config
        .apply_overrides(lookup(&[
            ("RESERVATION_DEBOUNCE_MS", "100"),
            ("RESERVATION_REJECT_PAST_DATES", "false"),
            ("RESERVATION_MAX_ALTERNATIVES", " 5 "),
        ]))
        .unwrap();
    assert_eq!(config.broadcast.debounce_ms, 100);
    assert!(!config.slots.reject_past_dates);
    assert_eq!(config.locking.max_alternatives, 5);
    assert_eq!(config.locking.lock_ttl_ms, 5_000);
}

#[test]
fn test_unparsable_override_names_the_variable() {
    let mut config = ReservationConfig::default();
    let err = config
        .apply_overrides(lookup(&[("RESERVATION_LOCK_TTL_MS", "soon")]))
        .unwrap_err();
    assert!(err.contains("RESERVATION_LOCK_TTL_MS"));
}

#[test]
fn test_json_file_loading() {
    let path = std::env::temp_dir().join(format!("reservation-config-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "broadcast": { "refresh_interval_secs": 5 } }"#).unwrap();
    let config = ReservationConfig::from_json_file(&path).unwrap();
    assert_eq!(config.broadcast.refresh_interval_secs, 5);
    std::fs::remove_file(&path).unwrap();

    assert!(ReservationConfig::from_json_file(&path).is_err());
}
