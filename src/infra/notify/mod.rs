//! Notification dispatchers.

pub mod log;
pub mod memory;

pub use log::LogDispatcher;
pub use memory::{RecordingDispatcher, SentNotification};
