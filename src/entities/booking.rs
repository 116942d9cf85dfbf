use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BookingRef, BookingStatus, BookingType, OwnerType, PaymentMethod};

/// A requested journey with fare, schedule, and settlement status.
///
/// `(owner_type, owner_id)` is the storage image of [`BookingRef`]; guest-
/// and account-owned bookings share this table, and promotion relinks a
/// booking by flipping the pair in place. The fare component columns are
/// the split-calculation inputs captured at booking time; `fare_estimate`
/// is their sum and is immutable once a payment transaction references
/// this booking.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub pickup_time: DateTime<Utc>,
    #[sea_orm(column_type = "Decimal(Some((8, 2)))")]
    pub distance_km: Decimal,
    /// JSON array of requested vehicle features
    #[sea_orm(column_type = "Json")]
    pub vehicle_features: Json,
    pub support_workers_count: i32,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub base_fare: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub distance_fare: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub vehicle_feature_fare: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub support_worker_fare: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub peak_surcharge: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub fare_estimate: Decimal,
    pub currency: String,
    pub booking_type: BookingType,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
    /// Reason recorded on payment failure (driver rejection or processor decline)
    #[sea_orm(nullable)]
    pub failure_reason: Option<String>,
    #[sea_orm(nullable)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::access_token::Entity")]
    AccessTokens,
    #[sea_orm(has_one = "super::payment_intent::Entity")]
    PaymentIntent,
    #[sea_orm(has_one = "super::payment_transaction::Entity")]
    PaymentTransaction,
}

impl Related<super::access_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccessTokens.def()
    }
}

impl Related<super::payment_intent::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentIntent.def()
    }
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn owner(&self) -> BookingRef {
        BookingRef::from_parts(self.owner_type, self.owner_id)
    }
}
