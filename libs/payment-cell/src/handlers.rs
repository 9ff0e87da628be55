// libs/payment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CheckoutBody, VerifyBody};
use crate::router::PaymentCellState;

#[axum::debug_handler]
pub async fn create_checkout(
    State(state): State<Arc<PaymentCellState>>,
    Extension(user): Extension<User>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<Value>, AppError> {
    let checkout = state
        .payments
        .start_checkout(&user, &body.appointment_id, body.amount)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "redirectUrl": checkout.redirect_url
    })))
}

/// Called after the checkout redirect; marks the appointment paid once the
/// provider confirms it.
#[axum::debug_handler]
pub async fn verify_payment(
    State(state): State<Arc<PaymentCellState>>,
    Extension(user): Extension<User>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<Value>, AppError> {
    let verification = state
        .payments
        .verify_payment(&user, &body.appointment_id)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "isPaid": verification.is_paid
    })))
}
