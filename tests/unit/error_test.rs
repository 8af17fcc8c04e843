//! Tests for error types

use reservation_core::core::{ErrorKind, ReservationError};

#[test]
fn test_error_display() {
    let err = ReservationError::Validation("party size must be between 1 and 50".to_string());
    assert_eq!(format!("{err}"), "invalid request: party size must be between 1 and 50");
    let err = ReservationError::NotFound("booking 42".to_string());
    assert_eq!(format!("{err}"), "not found: booking 42");
}

#[test]
fn test_only_unavailable_is_retryable() {
    assert!(ReservationError::Unavailable("store offline".into()).is_retryable());
    assert!(!ReservationError::Conflict("duplicate".into()).is_retryable());
    assert!(!ReservationError::Validation("bad".into()).is_retryable());
    assert!(!ReservationError::Internal("boom".into()).is_retryable());
}

#[test]
fn test_kinds() {
    assert_eq!(ReservationError::Conflict(String::new()).kind(), ErrorKind::Conflict);
    assert_eq!(ReservationError::NotFound(String::new()).kind(), ErrorKind::NotFound);
    assert_eq!(ReservationError::Internal(String::new()).kind(), ErrorKind::Internal);
}

#[test]
fn test_internal_detail_is_masked() {
    let err = ReservationError::Internal("connection string postgres://secret".into());
    assert_eq!(err.public_message(), "internal error");
    let err = ReservationError::Conflict("customer c1 is already waiting".into());
    assert!(err.public_message().contains("already waiting"));
}

#[test]
fn test_serde_json_errors_are_internal() {
    let parse: Result<u32, _> = serde_json::from_str("{");
    let err: ReservationError = parse.unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn test_error_kind_serializes_screaming_snake() {
    assert_eq!(serde_json::to_string(&ErrorKind::NotFound).unwrap(), "\"NOT_FOUND\"");
}
