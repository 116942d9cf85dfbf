use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{access_token, guest_identity};
use crate::errors::ServiceError;

/// Contact details captured with an unauthenticated booking.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct GuestContact {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
}

/// 32 bytes of CSPRNG output, url-safe base64. Opaque by construction;
/// nothing about the booking can be read out of the token itself.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Manages guest identities and the access tokens that let an
/// unauthenticated rider see their own booking.
#[derive(Clone)]
pub struct GuestService {
    db_pool: Arc<DbPool>,
    token_ttl: chrono::Duration,
}

impl GuestService {
    pub fn new(db_pool: Arc<DbPool>, token_ttl: chrono::Duration) -> Self {
        Self { db_pool, token_ttl }
    }

    /// Create or refresh the guest identity for an email address.
    ///
    /// Emails are matched case-insensitively by storing them lowercased.
    /// The write is a single `ON CONFLICT (email) DO UPDATE`, so two
    /// concurrent first bookings for the same rider converge on one row
    /// without a read-then-insert race.
    #[instrument(skip(self, contact), fields(email = %contact.email))]
    pub async fn upsert_guest(
        &self,
        contact: &GuestContact,
    ) -> Result<guest_identity::Model, ServiceError> {
        contact.validate()?;
        let email = contact.email.trim().to_lowercase();
        let now = Utc::now();

        let active = guest_identity::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(contact.name.trim().to_string()),
            email: Set(email.clone()),
            phone: Set(contact.phone.trim().to_string()),
            promoted_account_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        guest_identity::Entity::insert(active)
            .on_conflict(
                OnConflict::column(guest_identity::Column::Email)
                    .update_columns([
                        guest_identity::Column::Name,
                        guest_identity::Column::Phone,
                        guest_identity::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to upsert guest identity");
                ServiceError::DatabaseError(e)
            })?;

        let model = guest_identity::Entity::find()
            .filter(guest_identity::Column::Email.eq(email.clone()))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("guest identity missing after upsert".to_string())
            })?;

        info!(guest_identity_id = %model.id, "Guest identity upserted");
        Ok(model)
    }

    pub async fn get_guest(&self, id: Uuid) -> Result<guest_identity::Model, ServiceError> {
        guest_identity::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Guest identity {} not found", id)))
    }

    /// Mint a booking access token inside the caller's transaction, so the
    /// token never exists without its booking.
    pub async fn mint_access_token<C: ConnectionTrait>(
        &self,
        conn: &C,
        booking_id: Uuid,
    ) -> Result<access_token::Model, ServiceError> {
        let now = Utc::now();
        let active = access_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            token: Set(generate_token()),
            booking_id: Set(booking_id),
            expires_at: Set(now + self.token_ttl),
            created_at: Set(now),
        };

        let model = active.insert(conn).await.map_err(|e| {
            error!(error = %e, booking_id = %booking_id, "Failed to mint access token");
            ServiceError::DatabaseError(e)
        })?;
        Ok(model)
    }

    /// Look a token up, distinguishing unknown from expired. An expired
    /// token must never resolve to its booking.
    #[instrument(skip(self, token))]
    pub async fn resolve_token(&self, token: &str) -> Result<access_token::Model, ServiceError> {
        let record = access_token::Entity::find()
            .filter(access_token::Column::Token.eq(token))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Access token not found".to_string()))?;

        if record.is_expired(Utc::now()) {
            return Err(ServiceError::TokenExpired);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_long_enough() {
        let token = generate_token();
        // 32 bytes -> 43 characters of unpadded base64
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn contact_validation_rejects_bad_email() {
        let contact = GuestContact {
            name: "Rhonda Marsh".to_string(),
            email: "not-an-email".to_string(),
            phone: "+61 400 111 222".to_string(),
        };
        assert!(contact.validate().is_err());
    }
}
