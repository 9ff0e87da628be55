use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use appointment_cell::router::{appointment_routes, slot_routes, AppointmentCellState};
use appointment_cell::AppointmentService;
use payment_cell::router::{payment_routes, PaymentCellState};
use payment_cell::PaymentService;
use session_cell::handlers::sliding_session;
use session_cell::router::{session_routes, SessionCellState};
use shared_config::AppConfig;
use shared_database::DocumentStore;

pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub appointments: Arc<AppointmentService>,
    /// Absent when no payment provider is configured.
    pub payments: Option<Arc<PaymentService>>,
}

pub fn create_router(services: AppServices) -> Router {
    let appointment_state = Arc::new(AppointmentCellState {
        config: services.config.clone(),
        appointments: services.appointments.clone(),
    });
    let session_state = Arc::new(SessionCellState {
        config: services.config.clone(),
        store: services.store.clone(),
    });

    let mut router = Router::new()
        .route("/", get(|| async { "Telecare API is running!" }))
        .nest("/auth", session_routes(session_state))
        .nest("/appointments", appointment_routes(appointment_state.clone()))
        .nest("/slots", slot_routes(appointment_state));

    if let Some(payments) = services.payments {
        let payment_state = Arc::new(PaymentCellState {
            config: services.config.clone(),
            payments,
        });
        router = router.nest("/payments", payment_routes(payment_state));
    }

    router.layer(middleware::from_fn_with_state(services.config, sliding_session))
}
