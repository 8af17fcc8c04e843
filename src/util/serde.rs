//! Serializable identifiers shared across the crate.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Business (tenant) identifier.
pub type BusinessId = String;
/// Location identifier within a business.
pub type LocationId = String;
/// Schedulable resource (table, room) identifier.
pub type ResourceId = String;
/// Customer identifier; customer CRUD lives outside this crate.
pub type CustomerId = String;
/// Durable booking identifier.
pub type BookingId = Uuid;
/// Waitlist entry identifier.
pub type WaitlistEntryId = Uuid;
/// Live availability subscription identifier.
pub type SubscriptionId = Uuid;

/// Opaque token proving ownership of a coordination lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(pub String);

impl LockToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Scope of a waitlist or broadcast key: a business and optionally one of its locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Business identifier.
    pub business_id: BusinessId,
    /// Location identifier; `None` means business-wide.
    pub location_id: Option<LocationId>,
}

impl Scope {
    /// Build a scope.
    pub fn new(business_id: impl Into<BusinessId>, location_id: Option<LocationId>) -> Self {
        Self {
            business_id: business_id.into(),
            location_id,
        }
    }

    /// Location segment used in cache and channel keys (`*` when business-wide).
    #[must_use]
    pub fn location_segment(&self) -> Cow<'_, str> {
        self.location_id
            .as_deref()
            .map_or(Cow::Borrowed("*"), key_segment)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", key_segment(&self.business_id), self.location_segment())
    }
}

/// Escape an id for use as one `:`-separated key segment.
///
/// `%`, `:` and `*` are percent-encoded, so an id can neither split a key nor
/// pose as the business-wide `*` segment.
#[must_use]
pub fn key_segment(id: &str) -> Cow<'_, str> {
    if !id.contains(['%', ':', '*']) {
        return Cow::Borrowed(id);
    }
    let mut escaped = String::with_capacity(id.len() + 4);
    for c in id.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '*' => escaped.push_str("%2A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
