//! Fire-and-forget customer notifications.

use std::sync::Arc;

use crate::core::ports::{spawn_detached, DeliveryStatus, NotificationDispatcher, Spawn, TemplateKind};
use crate::util::serde::CustomerId;

/// Sends notifications in the background so no caller waits on delivery.
/// Failures are logged and otherwise dropped.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    spawner: Arc<dyn Spawn>,
}

impl Notifier {
    /// Build a notifier.
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, spawner: Arc<dyn Spawn>) -> Self {
        Self {
            dispatcher,
            spawner,
        }
    }

    /// Queue one notification.
    pub fn notify(&self, customer_id: &CustomerId, template: TemplateKind, data: serde_json::Value) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let customer_id = customer_id.clone();
        spawn_detached(self.spawner.as_ref(), async move {
            match dispatcher.send(&customer_id, template, data).await {
                DeliveryStatus::Delivered => {
                    tracing::debug!(customer = %customer_id, ?template, "notification delivered");
                }
                DeliveryStatus::Failed(reason) => {
                    tracing::warn!(customer = %customer_id, ?template, %reason, "notification failed");
                }
            }
        });
    }
}
