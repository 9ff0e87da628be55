// libs/session-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::DocumentStore;
use shared_models::auth::UserRole;
use shared_models::error::AppError;
use shared_utils::jwt::validate_token;

use crate::cookies::{append_set_cookies, expired_cookies, has_active_session, session_cookies, sliding_cookies};
use crate::error::SessionError;
use crate::models::{IdlePolicy, SessionBody, USERS_COLLECTION};
use crate::router::SessionCellState;

/// Role stored on the user's profile; patients are the default.
async fn resolve_role(store: &dyn DocumentStore, user_id: &str) -> Result<UserRole, SessionError> {
    let profile = store.get(USERS_COLLECTION, user_id).await?;
    let raw = profile
        .as_ref()
        .and_then(|profile| profile.get("role"))
        .and_then(|role| role.as_str());

    Ok(UserRole::normalize(raw).unwrap_or_else(|_| {
        warn!("User {} has an unknown profile role, treating as patient", user_id);
        UserRole::Patient
    }))
}

/// Establishes the cookie session for a verified identity token.
#[axum::debug_handler]
pub async fn create_session(
    State(state): State<Arc<SessionCellState>>,
    Json(body): Json<SessionBody>,
) -> Result<(HeaderMap, Json<Value>), AppError> {
    if body.id_token.trim().is_empty() {
        return Err(SessionError::MissingToken.into());
    }

    let user = validate_token(body.id_token.trim(), &state.config.supabase_jwt_secret)
        .map_err(SessionError::InvalidToken)?;
    let role = resolve_role(state.store.as_ref(), &user.id).await?;

    let policy = IdlePolicy::from_config(&state.config);
    let mut headers = HeaderMap::new();
    append_set_cookies(
        &mut headers,
        session_cookies(role, Utc::now(), policy.marker_max_age(), state.config.production),
    )?;

    info!("Session established for user {} as {}", user.id, role);
    Ok((headers, Json(json!({ "ok": true, "role": role }))))
}

#[axum::debug_handler]
pub async fn logout(State(state): State<Arc<SessionCellState>>) -> Result<(HeaderMap, Json<Value>), AppError> {
    let mut headers = HeaderMap::new();
    append_set_cookies(&mut headers, expired_cookies(state.config.production))?;

    Ok((headers, Json(json!({ "ok": true }))))
}

/// Re-issues the session cookies on every request that carries an active
/// session, keeping the idle window sliding.
pub async fn sliding_session(
    State(config): State<Arc<AppConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let renew = has_active_session(request.headers());
    let mut response = next.run(request).await;

    if renew {
        let policy = IdlePolicy::from_config(&config);
        let cookies = sliding_cookies(Utc::now(), policy.marker_max_age(), config.production);
        if let Err(e) = append_set_cookies(response.headers_mut(), cookies) {
            warn!("Could not renew session cookies: {}", e);
        } else {
            debug!("Session cookies renewed");
        }
    }

    response
}
