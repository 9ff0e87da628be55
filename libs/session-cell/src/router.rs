// libs/session-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::post, Router};

use shared_config::AppConfig;
use shared_database::DocumentStore;

use crate::handlers;

pub struct SessionCellState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
}

/// Public routes; the identity token in the body is the credential.
pub fn session_routes(state: Arc<SessionCellState>) -> Router {
    Router::new()
        .route("/session", post(handlers::create_session))
        .route("/logout", post(handlers::logout))
        .with_state(state)
}
