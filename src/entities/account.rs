use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable authenticated identity a guest may be promoted into.
/// `guest_identity_id` backlinks the promotion source; retried promotions
/// key on it to resume rather than create a second account.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Stored lowercased; uniqueness is case-insensitive by construction
    #[sea_orm(unique)]
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sea_orm(nullable)]
    pub guest_identity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::guest_identity::Entity",
        from = "Column::GuestIdentityId",
        to = "super::guest_identity::Column::Id"
    )]
    GuestIdentity,
}

impl Related<super::guest_identity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GuestIdentity.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
