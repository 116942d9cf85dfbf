pub mod accounts;
pub mod bookings;
pub mod payment_webhooks;
pub mod payments;
pub mod quotes;
pub mod settlement;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::message_queue::MessageQueue;
use crate::payment_processor::PaymentProcessorClient;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub bookings: Arc<crate::services::bookings::BookingService>,
    pub payments: Arc<crate::services::payments::PaymentService>,
    pub settlement: Arc<crate::services::settlement::SettlementService>,
    pub promotion: Arc<crate::services::promotion::PromotionService>,
}

impl AppServices {
    /// Wire up the service graph from its external seams: the database,
    /// the payment processor client, and the notification queue.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        processor: Arc<dyn PaymentProcessorClient>,
        message_queue: Arc<dyn MessageQueue>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let schedule =
            crate::services::fares::FareSchedule::new(config.fare_local_offset_minutes);
        let guests = crate::services::guests::GuestService::new(
            db_pool.clone(),
            config.guest_token_ttl(),
        );
        let notifications =
            crate::services::notifications::NotificationService::new(message_queue);

        let bookings = Arc::new(crate::services::bookings::BookingService::new(
            db_pool.clone(),
            schedule,
            guests.clone(),
            config.default_currency.clone(),
            event_sender.clone(),
        ));
        let settlement = crate::services::settlement::SettlementService::new(
            db_pool.clone(),
            notifications.clone(),
            event_sender.clone(),
        );
        let payments = Arc::new(crate::services::payments::PaymentService::new(
            db_pool.clone(),
            processor,
            settlement.clone(),
            notifications,
            event_sender.clone(),
        ));
        let promotion = Arc::new(crate::services::promotion::PromotionService::new(
            db_pool,
            guests,
            event_sender,
        ));

        Self {
            bookings,
            payments,
            settlement: Arc::new(settlement),
            promotion,
        }
    }
}
