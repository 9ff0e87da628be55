pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::AppointmentError;
pub use router::{appointment_routes, slot_routes, AppointmentCellState};
pub use services::booking::{AppointmentService, PendingRequestFeed};
pub use services::lifecycle::AppointmentLifecycleService;
pub use services::notification::{LogNotifier, NotificationError, Notifier, SmsGatewayNotifier};
pub use services::slots::SlotReservationService;
