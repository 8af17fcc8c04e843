//! Infrastructure adapters for stores, coordination backends and notification dispatch.

pub mod coordination;
pub mod notify;
pub mod store;

pub use coordination::InMemoryCoordination;
pub use notify::{LogDispatcher, RecordingDispatcher, SentNotification};
pub use store::InMemoryStore;
