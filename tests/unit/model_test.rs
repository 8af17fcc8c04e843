//! Tests for domain model helpers

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use reservation_core::core::model::{
    BookingStatus, OperatingWindow, Resource, ResourceStatus, TimeWindow,
};

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2031, 3, 4)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

#[test]
fn test_half_open_overlap() {
    let booked = TimeWindow::starting_at(at(12, 0), 60);
    assert!(booked.overlaps(&TimeWindow::starting_at(at(12, 30), 60)));
    assert!(booked.overlaps(&TimeWindow::starting_at(at(11, 30), 60)));
    assert!(!booked.overlaps(&TimeWindow::starting_at(at(13, 0), 60)));
    assert!(!booked.overlaps(&TimeWindow::starting_at(at(11, 0), 60)));
}

#[test]
fn test_day_window_covers_whole_date() {
    let day = TimeWindow::day(at(0, 0).date());
    assert!(day.overlaps(&TimeWindow::starting_at(at(23, 30), 60)));
    assert_eq!(day.date(), at(0, 0).date());
}

#[test]
fn test_quarter_hour_grid() {
    let window = OperatingWindow {
        business_id: "b1".into(),
        location_id: None,
        weekday: Weekday::Tue,
        open: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        close: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        granularity_minutes: 15,
    };
    let starts = window.candidate_starts(at(0, 0).date(), 90);
    assert_eq!(starts.first(), Some(&at(18, 0)));
    assert_eq!(starts.last(), Some(&at(20, 30)));
    assert_eq!(starts.len(), 11);
    assert!(window.accepts(at(19, 45), 90));
    assert!(!window.accepts(at(20, 45), 90));
}

#[test]
fn test_out_of_service_resource() {
    let mut resource = Resource {
        id: "t1".into(),
        business_id: "b1".into(),
        location_id: "l1".into(),
        name: "Window".into(),
        capacity: 4,
        status: ResourceStatus::Occupied,
    };
    assert!(resource.in_service());
    resource.status = ResourceStatus::OutOfService;
    assert!(!resource.in_service());
}

#[test]
fn test_terminal_statuses_release_the_resource() {
    for status in [BookingStatus::Completed, BookingStatus::Cancelled, BookingStatus::NoShow] {
        assert!(status.is_terminal());
        assert!(!status.is_active());
        assert!(!BookingStatus::ACTIVE.contains(&status));
    }
    assert!(BookingStatus::CheckedIn.can_transition_to(BookingStatus::Cancelled));
    assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Seated));
}

#[test]
fn test_status_serializes_screaming_snake() {
    assert_eq!(serde_json::to_string(&BookingStatus::NoShow).unwrap(), "\"NO_SHOW\"");
    assert_eq!(
        serde_json::to_string(&ResourceStatus::OutOfService).unwrap(),
        "\"OUT_OF_SERVICE\""
    );
}
