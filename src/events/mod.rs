use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::BookingStatus;

/// Cloneable handle for emitting domain events from services.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Events emitted by the booking and settlement services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    BookingCreated(Uuid),
    BookingStatusChanged {
        booking_id: Uuid,
        old_status: BookingStatus,
        new_status: BookingStatus,
    },
    BookingCancelled(Uuid),
    PaymentIntentCreated {
        booking_id: Uuid,
        intent_id: Uuid,
    },
    PaymentSettled {
        booking_id: Uuid,
        transaction_id: Uuid,
    },
    PaymentFailed {
        booking_id: Uuid,
        reason: String,
    },
    GuestPromoted {
        guest_identity_id: Uuid,
        account_id: Uuid,
    },
    /// A charge succeeded upstream but the local settlement write did not
    /// complete; operational follow-up is required.
    ReconciliationFlagged {
        booking_id: Uuid,
        detail: String,
    },
}

/// Drains the event channel. Most events are informational; reconciliation
/// flags are logged at error level so they survive into alerting.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::ReconciliationFlagged { booking_id, detail } => {
                error!(
                    booking_id = %booking_id,
                    detail = %detail,
                    "Reconciliation flagged: settlement records incomplete after successful charge"
                );
            }
            Event::BookingStatusChanged {
                booking_id,
                old_status,
                new_status,
            } => {
                info!(
                    booking_id = %booking_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Booking status changed"
                );
            }
            Event::PaymentFailed { booking_id, reason } => {
                info!(booking_id = %booking_id, reason = %reason, "Payment failed");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
