use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::message_queue::{Message, MessageQueue, TOPIC_NOTIFICATIONS};

/// Internal audit channel for settlement actions.
const AUDIT_RECIPIENT: &str = "audit@careride.internal";
/// Operations channel for reconciliation alerts.
const PAYMENT_OPS_RECIPIENT: &str = "payments-ops@careride.internal";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Normal,
    High,
}

impl NotificationPriority {
    fn max_retries(self) -> u32 {
        match self {
            NotificationPriority::Normal => 3,
            NotificationPriority::High => 5,
        }
    }
}

/// Payload handed to the external dispatcher. Delivery and its retry loop
/// happen on the consumer side of the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub booking_id: Uuid,
    pub priority: NotificationPriority,
}

/// Enqueues settlement-outcome notices. Fire-and-forget: an enqueue
/// failure is logged and swallowed, never surfaced to the operation that
/// triggered it.
#[derive(Clone)]
pub struct NotificationService {
    queue: Arc<dyn MessageQueue>,
}

impl NotificationService {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    pub async fn enqueue(&self, notification: Notification) {
        let booking_id = notification.booking_id;
        let max_retries = notification.priority.max_retries();

        let payload = match serde_json::to_value(&notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, booking_id = %booking_id, "Failed to serialize notification");
                return;
            }
        };

        let message =
            Message::new(TOPIC_NOTIFICATIONS.to_string(), payload).with_max_retries(max_retries);
        if let Err(e) = self.queue.publish(message).await {
            warn!(error = %e, booking_id = %booking_id, "Failed to enqueue notification");
        }
    }

    /// Receipt to the rider after a settled payment.
    pub async fn payment_received(
        &self,
        recipient: &str,
        booking_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) {
        self.enqueue(Notification {
            recipient: recipient.to_string(),
            subject: "Payment received".to_string(),
            body: format!(
                "We received your payment of {} {} for booking {}. Thank you for riding with us.",
                amount, currency, booking_id
            ),
            booking_id,
            priority: NotificationPriority::Normal,
        })
        .await;
    }

    /// Rider-facing notice after a driver rejected a cash/bank payment.
    pub async fn payment_rejected(&self, recipient: &str, booking_id: Uuid, reason: &str) {
        self.enqueue(Notification {
            recipient: recipient.to_string(),
            subject: "Payment could not be confirmed".to_string(),
            body: format!(
                "Your payment for booking {} was not confirmed: {}. Please contact support or rebook.",
                booking_id, reason
            ),
            booking_id,
            priority: NotificationPriority::Normal,
        })
        .await;
    }

    /// Internal audit trail entry for a settlement action.
    pub async fn settlement_audit(&self, booking_id: Uuid, summary: &str) {
        self.enqueue(Notification {
            recipient: AUDIT_RECIPIENT.to_string(),
            subject: "Settlement action".to_string(),
            body: summary.to_string(),
            booking_id,
            priority: NotificationPriority::Normal,
        })
        .await;
    }

    /// Operations alert for a charge that settled upstream without complete
    /// local records.
    pub async fn reconciliation_alert(&self, booking_id: Uuid, detail: &str) {
        self.enqueue(Notification {
            recipient: PAYMENT_OPS_RECIPIENT.to_string(),
            subject: "Reconciliation required".to_string(),
            body: format!(
                "Booking {} has a settled charge with incomplete local records: {}",
                booking_id, detail
            ),
            booking_id,
            priority: NotificationPriority::High,
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_queue::MockMessageQueue;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn receipt_enqueues_exactly_one_message() {
        let queue = Arc::new(MockMessageQueue::new());
        let service = NotificationService::new(queue.clone());
        let booking_id = Uuid::new_v4();

        service
            .payment_received("rider@example.com", booking_id, dec!(46.00), "AUD")
            .await;

        let published = queue.get_published_messages();
        assert_eq!(published.len(), 1);

        let notification: Notification =
            serde_json::from_value(published[0].payload.clone()).unwrap();
        assert_eq!(notification.recipient, "rider@example.com");
        assert_eq!(notification.booking_id, booking_id);
        assert!(notification.body.contains("46.00 AUD"));
    }

    #[tokio::test]
    async fn reconciliation_alert_gets_a_bigger_retry_budget() {
        let queue = Arc::new(MockMessageQueue::new());
        let service = NotificationService::new(queue.clone());

        service
            .reconciliation_alert(Uuid::new_v4(), "splits missing")
            .await;
        service
            .payment_rejected("rider@example.com", Uuid::new_v4(), "rider had no cash")
            .await;

        let published = queue.get_published_messages();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].max_retries, 5);
        assert_eq!(published[1].max_retries, 3);
    }
}
