pub mod access_token;
pub mod account;
pub mod booking;
pub mod guest_identity;
pub mod payment_intent;
pub mod payment_split;
pub mod payment_transaction;
