// libs/payment-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::checkout::PaymentService;

pub struct PaymentCellState {
    pub config: Arc<AppConfig>,
    pub payments: Arc<PaymentService>,
}

pub fn payment_routes(state: Arc<PaymentCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/checkout", post(handlers::create_checkout))
        .route("/verify", post(handlers::verify_payment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
