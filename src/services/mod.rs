// Booking lifecycle
pub mod bookings;
pub mod fares;
pub mod guests;

// Payment and settlement
pub mod payments;
pub mod settlement;

// Account management
pub mod promotion;

// Outbound messaging
pub mod notifications;
