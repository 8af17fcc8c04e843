//! Dispatcher that only logs, for deployments without a delivery channel.

use async_trait::async_trait;

use crate::core::ports::{DeliveryStatus, NotificationDispatcher, TemplateKind};
use crate::util::serde::CustomerId;

/// Writes each notification to the tracing log and reports it delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(
        &self,
        customer_id: &CustomerId,
        template: TemplateKind,
        data: serde_json::Value,
    ) -> DeliveryStatus {
        tracing::info!(customer = %customer_id, ?template, %data, "notification");
        DeliveryStatus::Delivered
    }
}
