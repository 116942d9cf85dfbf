use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{RecipientType, SplitStatus};

/// One recipient's share of a settled payment. The amounts of a
/// transaction's splits sum to the transaction amount exactly; the
/// `processor` row carries the processing fee so that identity holds
/// without a side ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_splits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub payment_transaction_id: Uuid,
    pub recipient_type: RecipientType,
    /// Payee identifier once assignment is known; payout routing is
    /// outside this core
    #[sea_orm(nullable)]
    pub recipient_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount: Decimal,
    pub status: SplitStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment_transaction::Entity",
        from = "Column::PaymentTransactionId",
        to = "super::payment_transaction::Column::Id"
    )]
    PaymentTransaction,
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
