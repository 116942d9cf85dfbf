use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{account, booking, guest_identity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{BookingRef, OwnerType};
use crate::services::bookings::fetch_booking;
use crate::services::guests::GuestService;

/// Request to turn a guest identity into a durable account. The access
/// token proves the caller is the rider who made the booking; no other
/// authentication exists for guests.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PromoteRequest {
    pub access_token: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8 to 128 characters"))]
    pub password: String,
    /// Relink every booking the guest identity owns, not just the one the
    /// token points at.
    #[serde(default)]
    pub include_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub guest_identity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PromoteResponse {
    pub account: AccountResponse,
    /// True when a previous call already created the account; this call
    /// only resumed whatever relinking was left.
    pub already_promoted: bool,
    pub relinked_bookings: u64,
}

fn account_response(model: account::Model) -> AccountResponse {
    AccountResponse {
        id: model.id,
        name: model.name,
        email: model.email,
        phone: model.phone,
        guest_identity_id: model.guest_identity_id,
        created_at: model.created_at,
    }
}

/// Promotes guest identities into accounts. One-time and idempotent per
/// identity: bookings are relinked by reference, never copied, and a retry
/// after a partial failure resumes instead of creating a second account.
#[derive(Clone)]
pub struct PromotionService {
    db_pool: Arc<DbPool>,
    guests: GuestService,
    event_sender: Option<Arc<EventSender>>,
}

impl PromotionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        guests: GuestService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            guests,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send promotion event");
            }
        }
    }

    fn hash_password(password: &str) -> Result<String, ServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {}", e)))?
            .to_string())
    }

    /// Relink guest-owned bookings to the account in one statement.
    /// Returns how many rows moved; re-running after completion moves none.
    async fn relink_bookings(
        &self,
        guest_id: Uuid,
        account_id: Uuid,
        triggering_booking: Uuid,
        include_history: bool,
    ) -> Result<u64, ServiceError> {
        let mut update = booking::Entity::update_many()
            .col_expr(booking::Column::OwnerType, Expr::value(OwnerType::Account))
            .col_expr(booking::Column::OwnerId, Expr::value(account_id))
            .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(booking::Column::OwnerType.eq(OwnerType::Guest))
            .filter(booking::Column::OwnerId.eq(guest_id));

        if !include_history {
            update = update.filter(booking::Column::Id.eq(triggering_booking));
        }

        let result = update.exec(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, guest_identity_id = %guest_id, "Failed to relink bookings");
            ServiceError::DatabaseError(e)
        })?;
        Ok(result.rows_affected)
    }

    async fn mark_promoted(&self, guest_id: Uuid, account_id: Uuid) -> Result<(), ServiceError> {
        guest_identity::Entity::update_many()
            .col_expr(
                guest_identity::Column::PromotedAccountId,
                Expr::value(Some(account_id)),
            )
            .col_expr(guest_identity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(guest_identity::Column::Id.eq(guest_id))
            .exec(&*self.db_pool)
            .await?;
        Ok(())
    }

    /// Promote the guest identity behind an access token into an account.
    #[instrument(skip(self, request))]
    pub async fn promote(&self, request: PromoteRequest) -> Result<PromoteResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let access = self.guests.resolve_token(&request.access_token).await?;
        let booking_model = fetch_booking(db, access.booking_id).await?;

        let guest_id = match booking_model.owner() {
            BookingRef::Guest(id) => id,
            BookingRef::Account(account_id) => {
                // The triggering booking is already account-owned; resume
                // by finishing any history relink and reporting the account
                let account_model = account::Entity::find_by_id(account_id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Booking {} is owned by missing account {}",
                            booking_model.id, account_id
                        ))
                    })?;

                let relinked = match account_model.guest_identity_id {
                    Some(guest_id) if request.include_history => {
                        self.relink_bookings(guest_id, account_id, booking_model.id, true)
                            .await?
                    }
                    _ => 0,
                };

                return Ok(PromoteResponse {
                    account: account_response(account_model),
                    already_promoted: true,
                    relinked_bookings: relinked,
                });
            }
        };

        let guest = guest_identity::Entity::find_by_id(guest_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Guest identity {} not found", guest_id))
            })?;

        // A prior partial promotion resumes; a stranger's account on the
        // same email conflicts
        let (account_model, already_promoted) = match self.existing_account(&guest).await? {
            ExistingAccount::Resumable(model) => (model, true),
            ExistingAccount::ForeignEmail => {
                return Err(ServiceError::Conflict(format!(
                    "An account already exists for {}",
                    guest.email
                )));
            }
            ExistingAccount::None => {
                let model = self.create_account(&guest, &request.password).await?;
                (model, false)
            }
        };

        let relinked = self
            .relink_bookings(
                guest.id,
                account_model.id,
                booking_model.id,
                request.include_history,
            )
            .await?;
        self.mark_promoted(guest.id, account_model.id).await?;

        info!(
            guest_identity_id = %guest.id,
            account_id = %account_model.id,
            relinked_bookings = relinked,
            resumed = already_promoted,
            "Guest promoted to account"
        );
        self.emit(Event::GuestPromoted {
            guest_identity_id: guest.id,
            account_id: account_model.id,
        })
        .await;

        Ok(PromoteResponse {
            account: account_response(account_model),
            already_promoted,
            relinked_bookings: relinked,
        })
    }

    async fn existing_account(
        &self,
        guest: &guest_identity::Model,
    ) -> Result<ExistingAccount, ServiceError> {
        let db = &*self.db_pool;

        if let Some(resume) = account::Entity::find()
            .filter(account::Column::GuestIdentityId.eq(guest.id))
            .one(db)
            .await?
        {
            return Ok(ExistingAccount::Resumable(resume));
        }

        if account::Entity::find()
            .filter(account::Column::Email.eq(guest.email.clone()))
            .one(db)
            .await?
            .is_some()
        {
            return Ok(ExistingAccount::ForeignEmail);
        }

        Ok(ExistingAccount::None)
    }

    async fn create_account(
        &self,
        guest: &guest_identity::Model,
        password: &str,
    ) -> Result<account::Model, ServiceError> {
        let now = Utc::now();
        let active = account::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(guest.name.clone()),
            email: Set(guest.email.clone()),
            phone: Set(guest.phone.clone()),
            password_hash: Set(Self::hash_password(password)?),
            guest_identity_id: Set(Some(guest.id)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(&*self.db_pool).await {
            Ok(model) => Ok(model),
            Err(insert_err) => {
                // Unique email: a concurrent promote of the same identity
                // resumes on the winner's row; anyone else's email conflicts
                match self.existing_account(guest).await? {
                    ExistingAccount::Resumable(model) => Ok(model),
                    ExistingAccount::ForeignEmail => Err(ServiceError::Conflict(format!(
                        "An account already exists for {}",
                        guest.email
                    ))),
                    ExistingAccount::None => {
                        error!(error = %insert_err, guest_identity_id = %guest.id, "Failed to create account");
                        Err(ServiceError::DatabaseError(insert_err))
                    }
                }
            }
        }
    }

    /// Staff view of an account.
    pub async fn get_account(&self, account_id: Uuid) -> Result<AccountResponse, ServiceError> {
        let model = account::Entity::find_by_id(account_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Account {} not found", account_id)))?;
        Ok(account_response(model))
    }
}

enum ExistingAccount {
    /// An account created by an earlier promotion of this same identity.
    Resumable(account::Model),
    /// Someone else already registered this email.
    ForeignEmail,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hashing_produces_verifiable_phc_strings() {
        use argon2::{PasswordHash, PasswordVerifier};

        let hash = PromotionService::hash_password("correct horse battery").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password("correct horse battery".as_bytes(), &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password("wrong password".as_bytes(), &parsed)
            .is_err());
    }

    #[test]
    fn short_passwords_fail_validation() {
        let request = PromoteRequest {
            access_token: "token".to_string(),
            password: "short".to_string(),
            include_history: false,
        };
        assert!(request.validate().is_err());
    }
}
