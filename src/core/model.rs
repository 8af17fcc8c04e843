//! Domain model: businesses, resources, bookings, operating windows, slots and
//! waitlist entries.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::util::serde::{
    BookingId, BusinessId, CustomerId, LocationId, ResourceId, WaitlistEntryId,
};

/// A business accepting reservations. Owned by CRUD outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    /// Identifier.
    pub id: BusinessId,
    /// Display name.
    pub name: String,
    /// Booking duration used when a request does not carry one.
    pub default_duration_minutes: u32,
    /// Largest party the business accepts.
    pub max_party_size: u32,
    /// Offset of the business's wall clock from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Business {
    /// The business's local calendar date at `now`.
    #[must_use]
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        (now.naive_utc() + Duration::minutes(i64::from(self.utc_offset_minutes))).date()
    }
}

/// Current physical status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    /// Free right now.
    Available,
    /// A party is seated.
    Occupied,
    /// Held for an imminent booking.
    Reserved,
    /// Removed from service; never offered.
    OutOfService,
}

/// A schedulable unit (table, room, chair) with a capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Identifier.
    pub id: ResourceId,
    /// Owning business.
    pub business_id: BusinessId,
    /// Owning location.
    pub location_id: LocationId,
    /// Display name.
    pub name: String,
    /// Seats.
    pub capacity: u32,
    /// Current status.
    pub status: ResourceStatus,
}

impl Resource {
    /// Whether the resource may be offered at all.
    #[must_use]
    pub fn in_service(&self) -> bool {
        self.status != ResourceStatus::OutOfService
    }
}

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Created, awaiting confirmation.
    Pending,
    /// Confirmed.
    Confirmed,
    /// Party has arrived.
    CheckedIn,
    /// Party is seated on the resource.
    Seated,
    /// Finished. Terminal.
    Completed,
    /// Cancelled. Terminal.
    Cancelled,
    /// Party never arrived. Terminal.
    NoShow,
}

impl BookingStatus {
    /// Statuses that occupy a resource for their time window.
    pub const ACTIVE: [Self; 4] = [Self::Pending, Self::Confirmed, Self::CheckedIn, Self::Seated];

    /// Whether a booking in this status blocks its resource.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Confirmed | Self::CheckedIn | Self::Seated
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Legal lifecycle transitions.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use BookingStatus::{Cancelled, CheckedIn, Completed, Confirmed, NoShow, Pending, Seated};
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, CheckedIn)
                | (Confirmed | CheckedIn, Seated)
                | (Seated, Completed)
                | (Pending | Confirmed, NoShow)
                | (Pending | Confirmed | CheckedIn | Seated, Cancelled)
        )
    }
}

/// Half-open time interval `[start, end)` in business wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: NaiveDateTime,
    /// Exclusive end.
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Window of `minutes` starting at `start`.
    #[must_use]
    pub fn starting_at(start: NaiveDateTime, minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(minutes)),
        }
    }

    /// The whole calendar day `date`.
    #[must_use]
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// Half-open overlap: touching endpoints do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Calendar date of the start.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }
}

/// A durable reservation of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Identifier.
    pub id: BookingId,
    /// Owning business.
    pub business_id: BusinessId,
    /// Owning location.
    pub location_id: LocationId,
    /// Assigned resource; `None` until assignment.
    pub resource_id: Option<ResourceId>,
    /// Customer the booking belongs to.
    pub customer_id: CustomerId,
    /// Start, business wall clock.
    pub start: NaiveDateTime,
    /// Duration in minutes.
    pub duration_minutes: u32,
    /// Party size.
    pub party_size: u32,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Interval occupied by this booking.
    #[must_use]
    pub fn window(&self) -> TimeWindow {
        TimeWindow::starting_at(self.start, self.duration_minutes)
    }
}

/// Fields supplied when creating a booking; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Owning business.
    pub business_id: BusinessId,
    /// Owning location.
    pub location_id: LocationId,
    /// Assigned resource.
    pub resource_id: Option<ResourceId>,
    /// Customer.
    pub customer_id: CustomerId,
    /// Start, business wall clock.
    pub start: NaiveDateTime,
    /// Duration in minutes.
    pub duration_minutes: u32,
    /// Party size.
    pub party_size: u32,
    /// Initial status.
    pub status: BookingStatus,
}

/// Opening hours for one weekday, with the slot grid granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingWindow {
    /// Owning business.
    pub business_id: BusinessId,
    /// Location override; `None` applies business-wide.
    pub location_id: Option<LocationId>,
    /// Day of week.
    pub weekday: Weekday,
    /// Opening time.
    pub open: NaiveTime,
    /// Closing time; bookings must end by then.
    pub close: NaiveTime,
    /// Slot grid step in minutes.
    pub granularity_minutes: u32,
}

impl OperatingWindow {
    /// Candidate start times on `date` for bookings of `duration_minutes`.
    #[must_use]
    pub fn candidate_starts(&self, date: NaiveDate, duration_minutes: u32) -> Vec<NaiveDateTime> {
        let step = Duration::minutes(i64::from(self.granularity_minutes.max(1)));
        let duration = Duration::minutes(i64::from(duration_minutes));
        let close = date.and_time(self.close);
        let mut cursor = date.and_time(self.open);
        let mut starts = Vec::new();
        while cursor + duration <= close {
            starts.push(cursor);
            cursor += step;
        }
        starts
    }

    /// Whether `start` falls on the slot grid and the booking fits before close.
    #[must_use]
    pub fn accepts(&self, start: NaiveDateTime, duration_minutes: u32) -> bool {
        let open = start.date().and_time(self.open);
        let close = start.date().and_time(self.close);
        let end = start + Duration::minutes(i64::from(duration_minutes));
        if start < open || end > close {
            return false;
        }
        let offset = (start - open).num_minutes();
        offset % i64::from(self.granularity_minutes.max(1)) == 0
    }
}

/// Availability of one resource in a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAvailability {
    /// Resource identifier.
    pub resource_id: ResourceId,
    /// Seats.
    pub capacity: u32,
    /// Free for the whole slot window.
    pub available: bool,
}

/// Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    /// Slot start time.
    pub time: NaiveDateTime,
    /// Seat sum of in-service resources large enough for the party.
    pub total_capacity: u32,
    /// Seat sum of those resources already booked in the slot window.
    pub reserved: u32,
    /// At least one qualifying resource is free.
    pub available: bool,
    /// Candidate resources, smallest first.
    pub resources: Vec<ResourceAvailability>,
}

/// Waitlist entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitlistStatus {
    /// In the queue.
    Waiting,
    /// Seated. Terminal.
    Seated,
    /// Left without being seated. Terminal.
    Left,
}

/// A walk-in party queued for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Identifier.
    pub id: WaitlistEntryId,
    /// Owning business.
    pub business_id: BusinessId,
    /// Location; `None` queues business-wide.
    pub location_id: Option<LocationId>,
    /// Customer.
    pub customer_id: CustomerId,
    /// Display name announced to staff.
    pub display_name: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Party size.
    pub party_size: u32,
    /// 1-based position among WAITING entries; meaningless once terminal.
    pub position: u32,
    /// Status.
    pub status: WaitlistStatus,
    /// When the party joined.
    pub joined_at: DateTime<Utc>,
    /// When the party was seated.
    pub seated_at: Option<DateTime<Utc>>,
    /// When the party left.
    pub left_at: Option<DateTime<Utc>>,
    /// Current wait estimate in minutes.
    pub estimated_wait_minutes: u32,
    /// Actual wait in minutes, set when terminal.
    pub actual_wait_minutes: Option<u32>,
    /// Number of "you're next" notifications sent.
    pub notification_count: u32,
    /// Last notification timestamp.
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl WaitlistEntry {
    /// Minutes between joining and being seated, when seated.
    #[must_use]
    pub fn seated_wait(&self) -> Option<Duration> {
        self.seated_at.map(|seated| seated - self.joined_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2031, 3, 4)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn window() -> OperatingWindow {
        OperatingWindow {
            business_id: "b".into(),
            location_id: None,
            weekday: Weekday::Tue,
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            granularity_minutes: 30,
        }
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        let a = TimeWindow::starting_at(at(12, 0), 60);
        let b = TimeWindow::starting_at(at(13, 0), 60);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        let c = TimeWindow::starting_at(at(12, 59), 1);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn candidate_starts_end_before_close() {
        let starts = window().candidate_starts(at(0, 0).date(), 60);
        assert_eq!(starts.first(), Some(&at(9, 0)));
        assert_eq!(starts.last(), Some(&at(16, 0)));
        assert_eq!(starts.len(), 15);
    }

    #[test]
    fn accepts_only_grid_aligned_starts() {
        let w = window();
        assert!(w.accepts(at(12, 0), 60));
        assert!(!w.accepts(at(12, 10), 60));
        assert!(!w.accepts(at(8, 30), 60));
        assert!(!w.accepts(at(16, 30), 60));
    }

    #[test]
    fn local_date_follows_the_business_offset() {
        let mut business = Business {
            id: "b".into(),
            name: "B".into(),
            default_duration_minutes: 60,
            max_party_size: 8,
            utc_offset_minutes: 0,
        };
        let now = at(2, 0).and_utc() + Duration::days(1);
        assert_eq!(business.local_date(now), at(0, 0).date() + Duration::days(1));
        business.utc_offset_minutes = -10 * 60;
        assert_eq!(business.local_date(now), at(0, 0).date());
        business.utc_offset_minutes = 9 * 60;
        assert_eq!(business.local_date(at(20, 0).and_utc()), at(0, 0).date() + Duration::days(1));
    }

    #[test]
    fn booking_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Seated));
        assert!(Seated.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(NoShow));
        assert!(!Seated.can_transition_to(NoShow));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(Cancelled.is_terminal() && !Cancelled.is_active());
    }
}
