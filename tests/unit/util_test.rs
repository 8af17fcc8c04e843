//! Tests for utility functions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reservation_core::core::ReservationError;
use reservation_core::util::{retry_with_backoff, LockToken, RetryPolicy, Scope};

#[test]
fn test_scope_display() {
    assert_eq!(Scope::new("b1", Some("l1".into())).to_string(), "b1:l1");
    assert_eq!(Scope::new("b1", None).to_string(), "b1:*");
}

#[test]
fn test_lock_tokens_are_unique() {
    assert_ne!(LockToken::generate(), LockToken::generate());
}

#[test]
fn test_backoff_is_capped() {
    let policy = RetryPolicy {
        max_retries: 10,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
    };
    assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
    assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(40));
    assert_eq!(policy.delay_for_attempt(8), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_retry_stops_on_permanent_error() {
    let calls = AtomicUsize::new(0);
    let result: Result<(), ReservationError> = retry_with_backoff(
        &RetryPolicy::default(),
        ReservationError::is_retryable,
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ReservationError::NotFound("business b9".into())) }
        },
    )
    .await;
    assert!(matches!(result, Err(ReservationError::NotFound(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_transient_error() {
    let calls = AtomicUsize::new(0);
    let result = retry_with_backoff(&RetryPolicy::default(), ReservationError::is_retryable, || {
        let attempt = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 2 {
                Err(ReservationError::Unavailable("store offline".into()))
            } else {
                Ok(attempt)
            }
        }
    })
    .await;
    assert_eq!(result, Ok(2));
}

#[test]
fn test_init_tracing_is_repeatable() {
    reservation_core::util::init_tracing_with("reservation_core=debug");
    reservation_core::util::init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}

#[test]
fn test_key_segments_cannot_collide() {
    use reservation_core::core::{reservation_lock_key, waitlist_customer_lock_key, waitlist_lock_key};
    use reservation_core::util::key_segment;

    assert_eq!(key_segment("main"), "main");
    assert_eq!(key_segment("a:b*c%"), "a%3Ab%2Ac%25");

    assert_ne!(waitlist_lock_key("b1", Some("*")), waitlist_lock_key("b1", None));
    assert_eq!(Scope::new("b1", Some("*".into())).to_string(), "b1:%2A");
    assert_ne!(
        waitlist_lock_key("b1:x", Some("y")),
        waitlist_lock_key("b1", Some("x:y"))
    );
    let date = chrono::NaiveDate::from_ymd_opt(2031, 3, 4).unwrap();
    assert_ne!(
        reservation_lock_key("b1", "x:2031-03-04", date),
        reservation_lock_key("b1:x", "2031-03-04", date)
    );
    assert_eq!(
        waitlist_customer_lock_key("b1", "ann"),
        "lock:waitlist-customer:b1:ann"
    );
}
