// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::AppointmentService;

pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub appointments: Arc<AppointmentService>,
}

pub fn appointment_routes(state: Arc<AppointmentCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment).get(handlers::list_appointments))
        .route("/slot-check", get(handlers::check_slot))
        .route("/admin/dismiss", post(handlers::dismiss_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", post(handlers::update_status))
        .route("/{appointment_id}/action", get(handlers::get_action))
        .route("/{appointment_id}/join", post(handlers::join_call))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn slot_routes(state: Arc<AppointmentCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::set_slot_status))
        .route("/{doctor_id}", get(handlers::get_slot_map))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
