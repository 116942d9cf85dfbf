use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{booking, payment_intent};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{BookingStatus, IntentStatus, PaymentMethod};
use crate::payment_processor::{PaymentProcessorClient, ProcessorChargeStatus};
use crate::services::bookings::{fetch_booking, status_conflict};
use crate::services::notifications::NotificationService;
use crate::services::settlement::{SettlementResponse, SettlementService};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub booking_id: Uuid,
    pub intent_id: Uuid,
    pub client_secret: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: IntentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConfirmProcessorPaymentRequest {
    /// Processor payment-method token chosen by the rider.
    #[validate(length(min = 1, max = 128))]
    pub payment_method: String,
}

/// Acknowledgement returned to the processor's callback. Duplicates are
/// acked rather than re-settled.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

/// Orchestrates the card-processor path: intent provisioning, charge
/// confirmation, and reconciling processor outcomes onto bookings.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    processor: Arc<dyn PaymentProcessorClient>,
    settlement: SettlementService,
    notifications: NotificationService,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        processor: Arc<dyn PaymentProcessorClient>,
        settlement: SettlementService,
        notifications: NotificationService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            processor,
            settlement,
            notifications,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send payment event");
            }
        }
    }

    fn intent_response(model: payment_intent::Model) -> PaymentIntentResponse {
        PaymentIntentResponse {
            booking_id: model.booking_id,
            intent_id: model.id,
            client_secret: model.client_secret,
            amount: model.amount,
            currency: model.currency,
            status: model.status,
        }
    }

    async fn find_intent(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<payment_intent::Model>, ServiceError> {
        Ok(payment_intent::Entity::find()
            .filter(payment_intent::Column::BookingId.eq(booking_id))
            .one(&*self.db_pool)
            .await?)
    }

    /// Move a draft booking to `pending_payment` once its intent exists.
    /// Already-pending bookings pass through; anything else conflicts.
    async fn ensure_pending(&self, booking_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let updated = booking::Entity::update_many()
            .col_expr(
                booking::Column::Status,
                Expr::value(BookingStatus::PendingPayment),
            )
            .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(booking::Column::Id.eq(booking_id))
            .filter(booking::Column::Status.eq(BookingStatus::Draft))
            .exec(db)
            .await?;

        if updated.rows_affected == 0 {
            let current = fetch_booking(db, booking_id).await?;
            if current.status != BookingStatus::PendingPayment {
                return Err(ServiceError::Conflict(format!(
                    "Booking {} is {}; cannot ready it for payment",
                    booking_id, current.status
                )));
            }
        } else {
            self.emit(Event::BookingStatusChanged {
                booking_id,
                old_status: BookingStatus::Draft,
                new_status: BookingStatus::PendingPayment,
            })
            .await;
        }
        Ok(())
    }

    /// Create the payment intent for a processor-path booking.
    ///
    /// Idempotent per booking: the local row is unique per booking id, the
    /// processor call is keyed by the booking id, and a retried call
    /// returns the intent the first call created. A processor failure
    /// leaves the booking where it was, safe to retry.
    #[instrument(skip(self))]
    pub async fn create_intent(
        &self,
        booking_id: Uuid,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let db = &*self.db_pool;
        let booking_model = fetch_booking(db, booking_id).await?;

        if booking_model.payment_method != PaymentMethod::Processor {
            return Err(ServiceError::InvalidOperation(format!(
                "Booking {} settles by cash/bank; it takes no payment intent",
                booking_id
            )));
        }
        match booking_model.status {
            BookingStatus::Draft | BookingStatus::PendingPayment => {}
            _ => {
                return Err(status_conflict(db, booking_id, "create a payment intent").await);
            }
        }

        if let Some(existing) = self.find_intent(booking_id).await? {
            self.ensure_pending(booking_id).await?;
            info!(booking_id = %booking_id, intent_id = %existing.id, "Reusing existing payment intent");
            return Ok(Self::intent_response(existing));
        }

        let metadata = serde_json::json!({ "booking_id": booking_id });
        let intent = self
            .processor
            .create_payment_intent(
                booking_model.fare_estimate,
                &booking_model.currency,
                &booking_id.to_string(),
                metadata,
            )
            .await?;

        let now = Utc::now();
        let active = payment_intent::ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(booking_id),
            processor_intent_id: Set(intent.id),
            client_secret: Set(intent.client_secret),
            amount: Set(booking_model.fare_estimate),
            currency: Set(booking_model.currency.clone()),
            status: Set(IntentStatus::Created),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let stored = match active.insert(db).await {
            Ok(model) => model,
            Err(insert_err) => {
                // Concurrent retry won the unique booking_id insert; both
                // processor calls shared an idempotency key, so the rows
                // describe the same processor intent
                match self.find_intent(booking_id).await? {
                    Some(existing) => existing,
                    None => {
                        error!(error = %insert_err, booking_id = %booking_id, "Failed to store payment intent");
                        return Err(ServiceError::DatabaseError(insert_err));
                    }
                }
            }
        };

        self.ensure_pending(booking_id).await?;

        info!(
            booking_id = %booking_id,
            intent_id = %stored.id,
            processor_intent_id = %stored.processor_intent_id,
            "Payment intent created"
        );
        self.emit(Event::PaymentIntentCreated {
            booking_id,
            intent_id: stored.id,
        })
        .await;

        Ok(Self::intent_response(stored))
    }

    /// Confirm the charge server-side with the processor, then settle on
    /// the spot. Declines surface as payment failures; network faults
    /// leave the booking `pending_payment` and are safe to retry.
    #[instrument(skip(self, request))]
    pub async fn confirm_with_processor(
        &self,
        booking_id: Uuid,
        request: ConfirmProcessorPaymentRequest,
    ) -> Result<SettlementResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let booking_model = fetch_booking(db, booking_id).await?;

        if booking_model.payment_method != PaymentMethod::Processor {
            return Err(ServiceError::InvalidOperation(format!(
                "Booking {} settles by cash/bank; confirm it with the driver",
                booking_id
            )));
        }
        if booking_model.status != BookingStatus::PendingPayment {
            return Err(status_conflict(db, booking_id, "confirm payment").await);
        }

        let intent = self.find_intent(booking_id).await?.ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "Booking {} has no payment intent; create one first",
                booking_id
            ))
        })?;

        let charge = self
            .processor
            .confirm_payment(&intent.client_secret, &request.payment_method)
            .await?;

        match charge.status {
            ProcessorChargeStatus::Succeeded => {
                self.apply_success(&booking_model, &intent, &charge.id)
                    .await?;
                self.settlement.get_settlement(booking_id).await
            }
            ProcessorChargeStatus::Failed => {
                let reason = "processor declined the charge".to_string();
                self.apply_failure(&booking_model, &intent, reason.clone())
                    .await?;
                Err(ServiceError::PaymentFailed(reason))
            }
        }
    }

    /// Entry point for the processor's asynchronous callback.
    #[instrument(skip(self, failure_reason), fields(processor_intent_id = %processor_intent_id))]
    pub async fn record_processor_outcome(
        &self,
        processor_intent_id: &str,
        status: ProcessorChargeStatus,
        charge_id: &str,
        failure_reason: Option<String>,
    ) -> Result<WebhookAck, ServiceError> {
        let intent = payment_intent::Entity::find()
            .filter(payment_intent::Column::ProcessorIntentId.eq(processor_intent_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No payment intent matches processor intent {}",
                    processor_intent_id
                ))
            })?;

        let booking_model = fetch_booking(&*self.db_pool, intent.booking_id).await?;

        match status {
            ProcessorChargeStatus::Succeeded => {
                self.apply_success(&booking_model, &intent, charge_id).await
            }
            ProcessorChargeStatus::Failed => {
                let reason =
                    failure_reason.unwrap_or_else(|| "processor declined the charge".to_string());
                self.apply_failure(&booking_model, &intent, reason).await
            }
        }
    }

    /// The charge is real; from here on every failure is a reconciliation
    /// defect, not a user error. One transient retry, then escalate.
    async fn apply_success(
        &self,
        booking_model: &booking::Model,
        intent: &payment_intent::Model,
        charge_id: &str,
    ) -> Result<WebhookAck, ServiceError> {
        let booking_id = booking_model.id;

        if self.settlement.settlement_exists(booking_id).await? {
            info!(booking_id = %booking_id, "Duplicate success callback; already settled");
            return Ok(WebhookAck {
                received: true,
                duplicate: true,
            });
        }

        let first = self
            .settlement
            .settle_booking(booking_model, Some(charge_id.to_string()))
            .await;

        let result = match first {
            Err(ServiceError::DatabaseError(e)) => {
                warn!(
                    booking_id = %booking_id,
                    error = %e,
                    "Settlement write failed after successful charge; retrying once"
                );
                self.settlement
                    .settle_booking(booking_model, Some(charge_id.to_string()))
                    .await
            }
            other => other,
        };

        match result {
            Ok(_) => {
                self.mark_intent(intent, IntentStatus::Succeeded).await;
                Ok(WebhookAck {
                    received: true,
                    duplicate: false,
                })
            }
            Err(ServiceError::Conflict(_)) => {
                // Lost the CAS: either a concurrent duplicate settled it,
                // or the booking left pending_payment with money taken
                if self.settlement.settlement_exists(booking_id).await? {
                    self.mark_intent(intent, IntentStatus::Succeeded).await;
                    return Ok(WebhookAck {
                        received: true,
                        duplicate: true,
                    });
                }
                let detail = format!(
                    "charge {} succeeded but booking {} is no longer awaiting payment",
                    charge_id, booking_id
                );
                self.escalate_reconciliation(booking_id, &detail).await;
                Err(ServiceError::ReconciliationDefect(detail))
            }
            Err(e) => {
                let detail = format!(
                    "charge {} succeeded but settlement records failed to write: {}",
                    charge_id, e
                );
                self.escalate_reconciliation(booking_id, &detail).await;
                Err(ServiceError::ReconciliationDefect(detail))
            }
        }
    }

    async fn apply_failure(
        &self,
        booking_model: &booking::Model,
        intent: &payment_intent::Model,
        reason: String,
    ) -> Result<WebhookAck, ServiceError> {
        let booking_id = booking_model.id;
        let db = &*self.db_pool;

        let updated = booking::Entity::update_many()
            .col_expr(
                booking::Column::Status,
                Expr::value(BookingStatus::PaymentFailed),
            )
            .col_expr(
                booking::Column::FailureReason,
                Expr::value(Some(reason.clone())),
            )
            .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(booking::Column::Id.eq(booking_id))
            .filter(booking::Column::Status.eq(BookingStatus::PendingPayment))
            .exec(db)
            .await?;

        if updated.rows_affected == 0 {
            // Duplicate decline, or the booking already settled/cancelled;
            // nothing to change, ack so the processor stops retrying
            info!(booking_id = %booking_id, "Ignoring processor failure for non-pending booking");
            return Ok(WebhookAck {
                received: true,
                duplicate: true,
            });
        }

        self.mark_intent(intent, IntentStatus::Failed).await;

        info!(booking_id = %booking_id, reason = %reason, "Processor payment failed");
        self.emit(Event::BookingStatusChanged {
            booking_id,
            old_status: BookingStatus::PendingPayment,
            new_status: BookingStatus::PaymentFailed,
        })
        .await;
        self.emit(Event::PaymentFailed {
            booking_id,
            reason: reason.clone(),
        })
        .await;

        if let Some(email) = self.owner_email(booking_model).await {
            self.notifications
                .payment_rejected(&email, booking_id, &reason)
                .await;
        }
        self.notifications
            .settlement_audit(booking_id, &format!("Processor payment failed: {}", reason))
            .await;

        Ok(WebhookAck {
            received: true,
            duplicate: false,
        })
    }

    async fn owner_email(&self, booking_model: &booking::Model) -> Option<String> {
        use crate::entities::{account, guest_identity};
        use crate::models::BookingRef;

        let result = match booking_model.owner() {
            BookingRef::Guest(id) => guest_identity::Entity::find_by_id(id)
                .one(&*self.db_pool)
                .await
                .map(|g| g.map(|g| g.email)),
            BookingRef::Account(id) => account::Entity::find_by_id(id)
                .one(&*self.db_pool)
                .await
                .map(|a| a.map(|a| a.email)),
        };
        match result {
            Ok(email) => email,
            Err(e) => {
                warn!(booking_id = %booking_model.id, error = %e, "Owner lookup failed; skipping notice");
                None
            }
        }
    }

    /// Intent status is advisory bookkeeping; failures here warn rather
    /// than failing an operation whose money movement already resolved.
    async fn mark_intent(&self, intent: &payment_intent::Model, status: IntentStatus) {
        let result = payment_intent::Entity::update_many()
            .col_expr(payment_intent::Column::Status, Expr::value(status))
            .col_expr(payment_intent::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_intent::Column::Id.eq(intent.id))
            .exec(&*self.db_pool)
            .await;
        if let Err(e) = result {
            warn!(intent_id = %intent.id, error = %e, "Failed to update intent status");
        }
    }

    async fn escalate_reconciliation(&self, booking_id: Uuid, detail: &str) {
        error!(
            booking_id = %booking_id,
            detail = %detail,
            "Reconciliation defect: money moved without matching settlement records"
        );
        self.emit(Event::ReconciliationFlagged {
            booking_id,
            detail: detail.to_string(),
        })
        .await;
        self.notifications
            .reconciliation_alert(booking_id, detail)
            .await;
    }
}
