use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{account, booking, guest_identity, payment_split, payment_transaction};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    BookingRef, BookingStatus, PaymentMethod, RecipientType, SplitStatus, TransactionStatus,
};
use crate::services::bookings::{fetch_booking, model_to_response, status_conflict, BookingResponse};
use crate::services::fares::{compute_split, FareComponents, FareSplit};
use crate::services::notifications::NotificationService;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RejectPaymentRequest {
    /// Why the driver could not take payment. Required; an empty reason is
    /// rejected before anything is written.
    #[validate(length(min = 1, max = 512, message = "a rejection reason is required"))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SplitView {
    pub recipient_type: RecipientType,
    pub amount: Decimal,
    pub status: SplitStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub processor_reference: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub splits: Vec<SplitView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettlementResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub transaction: TransactionView,
}

/// The recipient rows a settled transaction carries. Driver, processor,
/// and platform rows are always written; a support-worker row only exists
/// when that share is non-zero.
fn split_rows(split: &FareSplit) -> Vec<(RecipientType, Decimal)> {
    let mut rows = vec![(RecipientType::Driver, split.driver_share)];
    if !split.support_worker_share.is_zero() {
        rows.push((RecipientType::SupportWorker, split.support_worker_share));
    }
    rows.push((RecipientType::Processor, split.processor_fee));
    rows.push((RecipientType::Platform, split.platform_fee));
    rows
}

fn fare_components(model: &booking::Model) -> FareComponents {
    FareComponents {
        base_fare: model.base_fare,
        distance_fare: model.distance_fare,
        vehicle_feature_fare: model.vehicle_feature_fare,
        support_worker_fare: model.support_worker_fare,
        peak_surcharge: model.peak_surcharge,
    }
}

/// Settles payments onto bookings: the manual cash/bank confirm and reject
/// operations, and the shared settlement write the processor path reuses.
#[derive(Clone)]
pub struct SettlementService {
    db_pool: Arc<DbPool>,
    notifications: NotificationService,
    event_sender: Option<Arc<EventSender>>,
}

impl SettlementService {
    pub fn new(
        db_pool: Arc<DbPool>,
        notifications: NotificationService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            notifications,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send settlement event");
            }
        }
    }

    async fn owner_email(&self, owner: BookingRef) -> Option<String> {
        let result = match owner {
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
            Ok(Some(email)) => Some(email),
            Ok(None) => {
                warn!(owner = %owner, "Booking owner has no identity row; skipping notice");
                None
            }
            Err(e) => {
                warn!(owner = %owner, error = %e, "Owner lookup failed; skipping notice");
                None
            }
        }
    }

    /// The one settlement write. In a single transaction: compare-and-set
    /// the booking out of `pending_payment`, insert the completed
    /// PaymentTransaction, and insert its splits. A reader never observes a
    /// completed transaction with missing splits, and a raced second
    /// settlement rolls back into a conflict.
    ///
    /// Runs for both paths; `processor_reference` is the upstream charge id
    /// on the processor path and absent for cash/bank.
    pub(crate) async fn settle_booking(
        &self,
        booking_model: &booking::Model,
        processor_reference: Option<String>,
    ) -> Result<TransactionView, ServiceError> {
        let split = compute_split(&fare_components(booking_model))?;
        if split.total != booking_model.fare_estimate {
            // Never overwrite; a drifted row needs eyes, not a settlement
            return Err(ServiceError::InternalError(format!(
                "fare components sum to {} but fare_estimate is {} for booking {}",
                split.total, booking_model.fare_estimate, booking_model.id
            )));
        }

        let booking_id = booking_model.id;
        let now = Utc::now();

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, booking_id = %booking_id, "Failed to start settlement transaction");
            ServiceError::DatabaseError(e)
        })?;

        let updated = booking::Entity::update_many()
            .col_expr(
                booking::Column::Status,
                Expr::value(BookingStatus::PaymentConfirmed),
            )
            .col_expr(booking::Column::UpdatedAt, Expr::value(now))
            .filter(booking::Column::Id.eq(booking_id))
            .filter(booking::Column::Status.eq(BookingStatus::PendingPayment))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            txn.rollback().await.map_err(|e| {
                error!(error = %e, booking_id = %booking_id, "Settlement rollback failed");
                ServiceError::DatabaseError(e)
            })?;
            return Err(status_conflict(&*self.db_pool, booking_id, "confirm payment").await);
        }

        let tx_model = payment_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(booking_id),
            amount: Set(split.total),
            currency: Set(booking_model.currency.clone()),
            payment_method: Set(booking_model.payment_method),
            status: Set(TransactionStatus::Completed),
            processor_reference: Set(processor_reference),
            processed_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, booking_id = %booking_id, "Failed to insert payment transaction");
            ServiceError::DatabaseError(e)
        })?;

        let mut split_views = Vec::new();
        for (recipient_type, amount) in split_rows(&split) {
            let row = payment_split::ActiveModel {
                id: Set(Uuid::new_v4()),
                payment_transaction_id: Set(tx_model.id),
                recipient_type: Set(recipient_type),
                recipient_id: Set(None),
                amount: Set(amount),
                status: Set(SplitStatus::Pending),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    booking_id = %booking_id,
                    recipient_type = %recipient_type,
                    "Failed to insert payment split"
                );
                ServiceError::DatabaseError(e)
            })?;
            split_views.push(SplitView {
                recipient_type: row.recipient_type,
                amount: row.amount,
                status: row.status,
            });
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, booking_id = %booking_id, "Failed to commit settlement");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            booking_id = %booking_id,
            transaction_id = %tx_model.id,
            amount = %tx_model.amount,
            "Payment settled"
        );

        self.emit(Event::BookingStatusChanged {
            booking_id,
            old_status: BookingStatus::PendingPayment,
            new_status: BookingStatus::PaymentConfirmed,
        })
        .await;
        self.emit(Event::PaymentSettled {
            booking_id,
            transaction_id: tx_model.id,
        })
        .await;

        // Post-commit, by the single settlement winner: exactly one receipt
        // and one audit entry per settled booking
        if let Some(email) = self.owner_email(booking_model.owner()).await {
            self.notifications
                .payment_received(&email, booking_id, tx_model.amount, &tx_model.currency)
                .await;
        }
        self.notifications
            .settlement_audit(
                booking_id,
                &format!(
                    "Payment of {} {} settled via {} (transaction {})",
                    tx_model.amount, tx_model.currency, tx_model.payment_method, tx_model.id
                ),
            )
            .await;

        Ok(TransactionView {
            id: tx_model.id,
            booking_id,
            amount: tx_model.amount,
            currency: tx_model.currency,
            payment_method: tx_model.payment_method,
            status: tx_model.status,
            processor_reference: tx_model.processor_reference,
            processed_at: tx_model.processed_at,
            splits: split_views,
        })
    }

    /// Driver confirms they received cash or a bank transfer.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, booking_id: Uuid) -> Result<SettlementResponse, ServiceError> {
        let booking_model = fetch_booking(&*self.db_pool, booking_id).await?;

        if booking_model.payment_method != PaymentMethod::CashBank {
            return Err(ServiceError::InvalidOperation(format!(
                "Booking {} is paid via the card processor; manual confirmation is for cash/bank",
                booking_id
            )));
        }
        if booking_model.status != BookingStatus::PendingPayment {
            return Err(ServiceError::Conflict(format!(
                "Booking {} is {}; cannot confirm payment",
                booking_id, booking_model.status
            )));
        }

        let transaction = self.settle_booking(&booking_model, None).await?;

        Ok(SettlementResponse {
            booking_id,
            status: BookingStatus::PaymentConfirmed,
            transaction,
        })
    }

    /// Driver could not take payment. Requires a non-empty reason; writes
    /// no transaction, only the failed status and the reason.
    #[instrument(skip(self, request))]
    pub async fn reject_payment(
        &self,
        booking_id: Uuid,
        request: RejectPaymentRequest,
    ) -> Result<BookingResponse, ServiceError> {
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "a rejection reason is required".to_string(),
            ));
        }
        request.validate()?;

        let booking_model = fetch_booking(&*self.db_pool, booking_id).await?;
        if booking_model.payment_method != PaymentMethod::CashBank {
            return Err(ServiceError::InvalidOperation(format!(
                "Booking {} is paid via the card processor; manual rejection is for cash/bank",
                booking_id
            )));
        }

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
            return Err(status_conflict(db, booking_id, "reject payment").await);
        }

        info!(booking_id = %booking_id, reason = %reason, "Payment rejected by driver");
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

        if let Some(email) = self.owner_email(booking_model.owner()).await {
            self.notifications
                .payment_rejected(&email, booking_id, &reason)
                .await;
        }
        self.notifications
            .settlement_audit(booking_id, &format!("Payment rejected: {}", reason))
            .await;

        let model = fetch_booking(db, booking_id).await?;
        Ok(model_to_response(model))
    }

    /// Staff view of a settled booking's transaction and splits.
    #[instrument(skip(self))]
    pub async fn get_settlement(
        &self,
        booking_id: Uuid,
    ) -> Result<SettlementResponse, ServiceError> {
        let booking_model = fetch_booking(&*self.db_pool, booking_id).await?;

        let tx_model = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::BookingId.eq(booking_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No settlement recorded for booking {}", booking_id))
            })?;

        let splits = payment_split::Entity::find()
            .filter(payment_split::Column::PaymentTransactionId.eq(tx_model.id))
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(|row| SplitView {
                recipient_type: row.recipient_type,
                amount: row.amount,
                status: row.status,
            })
            .collect();

        Ok(SettlementResponse {
            booking_id,
            status: booking_model.status,
            transaction: TransactionView {
                id: tx_model.id,
                booking_id,
                amount: tx_model.amount,
                currency: tx_model.currency,
                payment_method: tx_model.payment_method,
                status: tx_model.status,
                processor_reference: tx_model.processor_reference,
                processed_at: tx_model.processed_at,
                splits,
            },
        })
    }

    /// True if a completed transaction already exists for the booking;
    /// used by the processor path to treat duplicate callbacks as acks.
    pub(crate) async fn settlement_exists(&self, booking_id: Uuid) -> Result<bool, ServiceError> {
        let existing = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::BookingId.eq(booking_id))
            .one(&*self.db_pool)
            .await?;
        Ok(existing.is_some())
    }
}
