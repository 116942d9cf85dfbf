pub mod booking;

pub use booking::{
    BookingRef, BookingStatus, BookingType, IntentStatus, OwnerType, PaymentMethod, RecipientType,
    SplitStatus, TransactionStatus, VehicleFeature,
};
