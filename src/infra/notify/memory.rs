//! In-memory dispatcher that records every send.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::ports::{DeliveryStatus, NotificationDispatcher, TemplateKind};
use crate::util::clock::now_ms;
use crate::util::serde::CustomerId;

/// A recorded notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    /// Recipient.
    pub customer_id: CustomerId,
    /// Template.
    pub template: TemplateKind,
    /// Template data.
    pub data: serde_json::Value,
    /// Timestamp milliseconds.
    pub sent_at_ms: u128,
}

/// Records notifications for inspection; can be switched to fail every send.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Snapshot of recorded notifications, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    /// Recorded notifications using `template`.
    #[must_use]
    pub fn sent_with(&self, template: TemplateKind) -> Vec<SentNotification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.template == template)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(
        &self,
        customer_id: &CustomerId,
        template: TemplateKind,
        data: serde_json::Value,
    ) -> DeliveryStatus {
        if self.failing.load(Ordering::Acquire) {
            return DeliveryStatus::Failed("dispatcher set to fail".into());
        }
        self.sent.lock().push(SentNotification {
            customer_id: customer_id.clone(),
            template,
            data,
            sent_at_ms: now_ms(),
        });
        DeliveryStatus::Delivered
    }
}
