use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Which table-level owner a booking belongs to. Together with the owner id
/// this is the storage image of [`BookingRef`].
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OwnerType {
    #[sea_orm(string_value = "guest")]
    Guest,
    #[sea_orm(string_value = "account")]
    Account,
}

/// A booking's owner, resolved once at the boundary. Everything downstream
/// of the handlers works with this union and never asks which storage shape
/// a booking came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "owner_type", content = "owner_id", rename_all = "snake_case")]
pub enum BookingRef {
    Guest(Uuid),
    Account(Uuid),
}

impl BookingRef {
    pub fn from_parts(owner_type: OwnerType, owner_id: Uuid) -> Self {
        match owner_type {
            OwnerType::Guest => BookingRef::Guest(owner_id),
            OwnerType::Account => BookingRef::Account(owner_id),
        }
    }

    pub fn owner_type(&self) -> OwnerType {
        match self {
            BookingRef::Guest(_) => OwnerType::Guest,
            BookingRef::Account(_) => OwnerType::Account,
        }
    }

    pub fn owner_id(&self) -> Uuid {
        match self {
            BookingRef::Guest(id) | BookingRef::Account(id) => *id,
        }
    }
}

impl std::fmt::Display for BookingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.owner_type(), self.owner_id())
    }
}

/// Booking lifecycle states
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "pending_payment")]
    PendingPayment,
    #[sea_orm(string_value = "payment_confirmed")]
    PaymentConfirmed,
    #[sea_orm(string_value = "payment_failed")]
    PaymentFailed,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl BookingStatus {
    /// The single transition table. Status writes are compare-and-set on the
    /// current value, so a transition listed here can still lose the race and
    /// surface as a conflict; one not listed here is rejected up front.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (Draft, PendingPayment) => true,

            (PendingPayment, PaymentConfirmed) => true,
            (PendingPayment, PaymentFailed) => true,

            (PaymentConfirmed, InProgress) => true,
            (InProgress, Completed) => true,

            // Cancellation is reachable from anything not yet completed
            (Draft, Cancelled)
            | (PendingPayment, Cancelled)
            | (PaymentConfirmed, Cancelled)
            | (PaymentFailed, Cancelled)
            | (InProgress, Cancelled) => true,

            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses a cancellation is allowed to start from
    pub fn cancellable() -> [BookingStatus; 5] {
        [
            BookingStatus::Draft,
            BookingStatus::PendingPayment,
            BookingStatus::PaymentConfirmed,
            BookingStatus::PaymentFailed,
            BookingStatus::InProgress,
        ]
    }
}

/// How the journey was scheduled
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingType {
    #[sea_orm(string_value = "on_demand")]
    OnDemand,
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "advance")]
    Advance,
}

/// How the rider pays
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cash_bank")]
    CashBank,
    #[sea_orm(string_value = "processor")]
    Processor,
}

/// Vehicle capabilities a rider can request; each carries a fare component
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VehicleFeature {
    WheelchairAccess,
    WalkerStorage,
    Stretcher,
    OxygenSupport,
    AssistanceAnimal,
}

/// Settlement transaction states
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Processor-side intent states mirrored locally
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Who a settled split belongs to
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientType {
    #[sea_orm(string_value = "driver")]
    Driver,
    #[sea_orm(string_value = "support_worker")]
    SupportWorker,
    #[sea_orm(string_value = "processor")]
    Processor,
    #[sea_orm(string_value = "platform")]
    Platform,
}

/// Payout state of a split; payout execution is outside this core
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SplitStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        use BookingStatus::*;
        assert!(Draft.can_transition_to(PendingPayment));
        assert!(PendingPayment.can_transition_to(PaymentConfirmed));
        assert!(PendingPayment.can_transition_to(PaymentFailed));
        assert!(PaymentConfirmed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn cancellation_reachable_from_everything_but_terminal_states() {
        use BookingStatus::*;
        for status in BookingStatus::cancellable() {
            assert!(status.can_transition_to(Cancelled), "{status} should cancel");
        }
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn settled_bookings_cannot_settle_again() {
        use BookingStatus::*;
        assert!(!PaymentConfirmed.can_transition_to(PaymentConfirmed));
        assert!(!PaymentConfirmed.can_transition_to(PaymentFailed));
        assert!(!PaymentFailed.can_transition_to(PaymentConfirmed));
    }

    #[test]
    fn no_backward_transitions() {
        use BookingStatus::*;
        assert!(!PendingPayment.can_transition_to(Draft));
        assert!(!PaymentConfirmed.can_transition_to(PendingPayment));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(PendingPayment));
    }

    #[test]
    fn booking_ref_round_trips_through_parts() {
        let id = Uuid::new_v4();
        let guest = BookingRef::Guest(id);
        assert_eq!(
            BookingRef::from_parts(guest.owner_type(), guest.owner_id()),
            guest
        );
        let account = BookingRef::Account(id);
        assert_eq!(account.owner_type(), OwnerType::Account);
        assert_eq!(account.owner_id(), id);
    }
}
