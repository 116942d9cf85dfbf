use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    PaginatorTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{account, booking};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{BookingRef, BookingStatus, BookingType, PaymentMethod, VehicleFeature};
use crate::services::fares::{FareComponents, FareSchedule, QuoteRequest};
use crate::services::guests::{GuestContact, GuestService};

/// Request to create a booking for an unauthenticated rider.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateGuestBookingRequest {
    #[validate]
    pub contact: GuestContact,
    #[validate]
    pub trip: QuoteRequest,
    pub payment_method: PaymentMethod,
}

/// Staff-side request to create a booking owned by an existing account.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateAccountBookingRequest {
    pub account_id: Uuid,
    #[validate]
    pub trip: QuoteRequest,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub owner: BookingRef,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub pickup_time: DateTime<Utc>,
    pub distance_km: Decimal,
    pub vehicle_features: Vec<VehicleFeature>,
    pub support_workers_count: i32,
    pub fare: FareComponents,
    pub fare_estimate: Decimal,
    pub currency: String,
    pub booking_type: BookingType,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
    pub failure_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Guest bookings come back with the access token the rider will use to
/// check on them. The token is shown once, here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuestBookingResponse {
    pub booking: BookingResponse,
    pub access_token: String,
    pub token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CancelBookingRequest {
    #[validate(length(max = 512))]
    pub reason: Option<String>,
}

pub(crate) fn model_to_response(model: booking::Model) -> BookingResponse {
    let vehicle_features: Vec<VehicleFeature> =
        serde_json::from_value(model.vehicle_features.clone()).unwrap_or_else(|e| {
            warn!(booking_id = %model.id, error = %e, "Stored vehicle features did not parse");
            Vec::new()
        });

    BookingResponse {
        id: model.id,
        owner: model.owner(),
        pickup_address: model.pickup_address,
        dropoff_address: model.dropoff_address,
        pickup_time: model.pickup_time,
        distance_km: model.distance_km,
        vehicle_features,
        support_workers_count: model.support_workers_count,
        fare: FareComponents {
            base_fare: model.base_fare,
            distance_fare: model.distance_fare,
            vehicle_feature_fare: model.vehicle_feature_fare,
            support_worker_fare: model.support_worker_fare,
            peak_surcharge: model.peak_surcharge,
        },
        fare_estimate: model.fare_estimate,
        currency: model.currency,
        booking_type: model.booking_type,
        payment_method: model.payment_method,
        status: model.status,
        failure_reason: model.failure_reason,
        cancellation_reason: model.cancellation_reason,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// Fetch a booking or fail with NotFound.
pub(crate) async fn fetch_booking<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
) -> Result<booking::Model, ServiceError> {
    booking::Entity::find_by_id(booking_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))
}

/// Build the error for a status write that matched zero rows: NotFound if
/// the booking does not exist, otherwise a conflict naming the status the
/// other actor left behind.
pub(crate) async fn status_conflict<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
    action: &str,
) -> ServiceError {
    match booking::Entity::find_by_id(booking_id).one(conn).await {
        Ok(Some(current)) => ServiceError::Conflict(format!(
            "Booking {} is {}; cannot {}",
            booking_id, current.status, action
        )),
        Ok(None) => ServiceError::NotFound(format!("Booking {} not found", booking_id)),
        Err(e) => ServiceError::DatabaseError(e),
    }
}

/// Booking lifecycle service. Every status write is compare-and-set on the
/// current status, so racing actors get exactly one winner and a conflict
/// for everyone else.
#[derive(Clone)]
pub struct BookingService {
    db_pool: Arc<DbPool>,
    schedule: FareSchedule,
    guests: GuestService,
    default_currency: String,
    event_sender: Option<Arc<EventSender>>,
}

impl BookingService {
    pub fn new(
        db_pool: Arc<DbPool>,
        schedule: FareSchedule,
        guests: GuestService,
        default_currency: String,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            schedule,
            guests,
            default_currency,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send booking event");
            }
        }
    }

    fn build_booking_model(
        &self,
        owner: BookingRef,
        trip: &QuoteRequest,
        fare: &FareComponents,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<booking::ActiveModel, ServiceError> {
        // Cash settles manually, so the booking is immediately awaiting
        // payment; the processor path stays draft until an intent exists
        let initial_status = match payment_method {
            PaymentMethod::CashBank => BookingStatus::PendingPayment,
            PaymentMethod::Processor => BookingStatus::Draft,
        };

        let features = serde_json::to_value(&trip.vehicle_features)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

        Ok(booking::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_type: Set(owner.owner_type()),
            owner_id: Set(owner.owner_id()),
            pickup_address: Set(trip.pickup_address.trim().to_string()),
            dropoff_address: Set(trip.dropoff_address.trim().to_string()),
            pickup_time: Set(trip.pickup_time),
            distance_km: Set(trip.distance_km),
            vehicle_features: Set(features),
            support_workers_count: Set(trip.support_workers_count),
            base_fare: Set(fare.base_fare),
            distance_fare: Set(fare.distance_fare),
            vehicle_feature_fare: Set(fare.vehicle_feature_fare),
            support_worker_fare: Set(fare.support_worker_fare),
            peak_surcharge: Set(fare.peak_surcharge),
            fare_estimate: Set(fare.total()),
            currency: Set(self.default_currency.clone()),
            booking_type: Set(trip.booking_type),
            payment_method: Set(payment_method),
            status: Set(initial_status),
            failure_reason: Set(None),
            cancellation_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
    }

    /// Create a booking for an unauthenticated rider: price the trip,
    /// upsert the guest identity, persist the booking, and mint the access
    /// token the rider will use to look it up.
    #[instrument(skip(self, request), fields(email = %request.contact.email))]
    pub async fn create_guest_booking(
        &self,
        request: CreateGuestBookingRequest,
    ) -> Result<GuestBookingResponse, ServiceError> {
        request.validate()?;
        let fare = self.schedule.quote(&request.trip)?;
        let guest = self.guests.upsert_guest(&request.contact).await?;

        let now = Utc::now();
        let model = self.build_booking_model(
            BookingRef::Guest(guest.id),
            &request.trip,
            &fare,
            request.payment_method,
            now,
        )?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start booking creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        let booking_model = model.insert(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to insert booking");
            ServiceError::DatabaseError(e)
        })?;

        let token = self.guests.mint_access_token(&txn, booking_model.id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, booking_id = %booking_model.id, "Failed to commit booking creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            booking_id = %booking_model.id,
            guest_identity_id = %guest.id,
            status = %booking_model.status,
            "Guest booking created"
        );
        self.emit(Event::BookingCreated(booking_model.id)).await;

        Ok(GuestBookingResponse {
            booking: model_to_response(booking_model),
            access_token: token.token,
            token_expires_at: token.expires_at,
        })
    }

    /// Staff path: create a booking owned by an existing account.
    #[instrument(skip(self, request), fields(account_id = %request.account_id))]
    pub async fn create_account_booking(
        &self,
        request: CreateAccountBookingRequest,
    ) -> Result<BookingResponse, ServiceError> {
        request.validate()?;
        let fare = self.schedule.quote(&request.trip)?;

        account::Entity::find_by_id(request.account_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Account {} not found", request.account_id))
            })?;

        let model = self.build_booking_model(
            BookingRef::Account(request.account_id),
            &request.trip,
            &fare,
            request.payment_method,
            Utc::now(),
        )?;

        let booking_model = model.insert(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, "Failed to insert account booking");
            ServiceError::DatabaseError(e)
        })?;

        info!(booking_id = %booking_model.id, "Account booking created");
        self.emit(Event::BookingCreated(booking_model.id)).await;

        Ok(model_to_response(booking_model))
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<BookingResponse, ServiceError> {
        let model = fetch_booking(&*self.db_pool, booking_id).await?;
        Ok(model_to_response(model))
    }

    /// Unauthenticated lookup by access token. Expired tokens fail before
    /// the booking is ever read.
    pub async fn get_booking_by_token(&self, token: &str) -> Result<BookingResponse, ServiceError> {
        let access = self.guests.resolve_token(token).await?;
        let model = fetch_booking(&*self.db_pool, access.booking_id).await?;
        Ok(model_to_response(model))
    }

    /// List bookings owned by a guest identity or account, newest first.
    #[instrument(skip(self))]
    pub async fn list_bookings_for_owner(
        &self,
        owner: BookingRef,
        page: u64,
        per_page: u64,
    ) -> Result<BookingListResponse, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let paginator = booking::Entity::find()
            .filter(booking::Column::OwnerType.eq(owner.owner_type()))
            .filter(booking::Column::OwnerId.eq(owner.owner_id()))
            .order_by_desc(booking::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page);

        let total = paginator.num_items().await?;
        let bookings = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(model_to_response)
            .collect();

        Ok(BookingListResponse {
            bookings,
            total,
            page,
            per_page,
        })
    }

    /// Driver picked the rider up.
    #[instrument(skip(self))]
    pub async fn start_trip(&self, booking_id: Uuid) -> Result<BookingResponse, ServiceError> {
        self.transition(
            booking_id,
            &[BookingStatus::PaymentConfirmed],
            BookingStatus::InProgress,
            "start the trip",
        )
        .await
    }

    /// Trip finished; the booking reaches its terminal success state.
    #[instrument(skip(self))]
    pub async fn complete_trip(&self, booking_id: Uuid) -> Result<BookingResponse, ServiceError> {
        self.transition(
            booking_id,
            &[BookingStatus::InProgress],
            BookingStatus::Completed,
            "complete the trip",
        )
        .await
    }

    async fn transition(
        &self,
        booking_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
        action: &str,
    ) -> Result<BookingResponse, ServiceError> {
        let db = &*self.db_pool;
        let result = booking::Entity::update_many()
            .col_expr(booking::Column::Status, Expr::value(to))
            .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(booking::Column::Id.eq(booking_id))
            .filter(booking::Column::Status.is_in(from.iter().copied()))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(status_conflict(db, booking_id, action).await);
        }

        info!(booking_id = %booking_id, new_status = %to, "Booking transitioned");
        self.emit(Event::BookingStatusChanged {
            booking_id,
            old_status: from[0],
            new_status: to,
        })
        .await;

        let model = fetch_booking(db, booking_id).await?;
        Ok(model_to_response(model))
    }

    /// Cancel a booking that has not completed. Races against settlement
    /// resolve through the same compare-and-set as confirm/reject: exactly
    /// one of the two writes lands.
    #[instrument(skip(self, request))]
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        request: CancelBookingRequest,
    ) -> Result<BookingResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let result = booking::Entity::update_many()
            .col_expr(
                booking::Column::Status,
                Expr::value(BookingStatus::Cancelled),
            )
            .col_expr(
                booking::Column::CancellationReason,
                Expr::value(reason.clone()),
            )
            .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(booking::Column::Id.eq(booking_id))
            .filter(booking::Column::Status.is_in(BookingStatus::cancellable()))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(status_conflict(db, booking_id, "cancel").await);
        }

        info!(booking_id = %booking_id, "Booking cancelled");
        self.emit(Event::BookingCancelled(booking_id)).await;

        let model = fetch_booking(db, booking_id).await?;
        Ok(model_to_response(model))
    }

    /// Rider-initiated cancellation through the booking's access token.
    pub async fn cancel_booking_by_token(
        &self,
        token: &str,
        request: CancelBookingRequest,
    ) -> Result<BookingResponse, ServiceError> {
        let access = self.guests.resolve_token(token).await?;
        self.cancel_booking(access.booking_id, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_model() -> booking::Model {
        let now = Utc::now();
        booking::Model {
            id: Uuid::new_v4(),
            owner_type: crate::models::OwnerType::Guest,
            owner_id: Uuid::new_v4(),
            pickup_address: "12 Harbour St".into(),
            dropoff_address: "4 Clinic Ln".into(),
            pickup_time: now,
            distance_km: dec!(5.00),
            vehicle_features: serde_json::json!(["wheelchair_access"]),
            support_workers_count: 1,
            base_fare: dec!(8.50),
            distance_fare: dec!(11.00),
            vehicle_feature_fare: dec!(6.00),
            support_worker_fare: dec!(20.50),
            peak_surcharge: dec!(0),
            fare_estimate: dec!(46.00),
            currency: "AUD".into(),
            booking_type: BookingType::OnDemand,
            payment_method: PaymentMethod::CashBank,
            status: BookingStatus::PendingPayment,
            failure_reason: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn response_carries_owner_and_parsed_features() {
        let model = sample_model();
        let owner_id = model.owner_id;
        let response = model_to_response(model);

        assert_eq!(response.owner, BookingRef::Guest(owner_id));
        assert_eq!(
            response.vehicle_features,
            vec![VehicleFeature::WheelchairAccess]
        );
        assert_eq!(response.fare.total(), response.fare_estimate);
    }

    #[test]
    fn malformed_stored_features_degrade_to_empty() {
        let mut model = sample_model();
        model.vehicle_features = serde_json::json!({"not": "a list"});
        let response = model_to_response(model);
        assert!(response.vehicle_features.is_empty());
    }
}
