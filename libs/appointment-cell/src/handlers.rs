// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentBody, DismissAppointmentsBody, SlotCheckQuery,
    SlotRef, SlotStatus, SlotStatusBody, UpdateStatusBody,
};
use crate::router::AppointmentCellState;

fn ensure_can_view(appointment: &Appointment, user: &User) -> Result<(), AppError> {
    if user.is_admin() || appointment.is_participant(&user.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not authorized to view this appointment".to_string()))
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(body): Json<BookAppointmentBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let request = body.into_request()?;
    let identity = user.identity();
    let appointment = state
        .appointments
        .create_appointment(Some(&identity), request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "appointment": appointment
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.appointments.list_for_user(&user.id, user.role).await?;
    let views: Vec<_> = appointments
        .into_iter()
        .map(|appointment| state.appointments.view_for(appointment, &user))
        .collect();

    Ok(Json(json!({
        "ok": true,
        "appointments": views
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.appointments.get(&appointment_id).await?;
    ensure_can_view(&appointment, &user)?;

    Ok(Json(json!({
        "ok": true,
        "appointment": appointment
    })))
}

/// Doctor of the appointment (or an admin) accepts or declines a request.
#[axum::debug_handler]
pub async fn update_status(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Value>, AppError> {
    let new_status = AppointmentStatus::parse(&body.status)?;

    let appointment = state.appointments.get(&appointment_id).await?;
    if !user.is_admin() && appointment.doctor_id != user.id {
        return Err(AppError::Forbidden(
            "Only the appointment's doctor can change its status".to_string(),
        ));
    }

    let updated = state.appointments.set_status(&appointment_id, new_status).await?;
    info!("User {} set appointment {} to {}", user.id, appointment_id, new_status);

    Ok(Json(json!({
        "ok": true,
        "appointment": updated
    })))
}

#[axum::debug_handler]
pub async fn get_action(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.appointments.get(&appointment_id).await?;
    ensure_can_view(&appointment, &user)?;

    let view = state.appointments.view_for(appointment, &user);
    Ok(Json(json!({
        "ok": true,
        "action": view.action
    })))
}

#[axum::debug_handler]
pub async fn join_call(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let ticket = state.appointments.join_call(&appointment_id, &user).await?;

    Ok(Json(json!({
        "ok": true,
        "appointmentId": ticket.appointment_id,
        "roomId": ticket.room_id
    })))
}

#[axum::debug_handler]
pub async fn check_slot(
    State(state): State<Arc<AppointmentCellState>>,
    Query(query): Query<SlotCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let slot = SlotRef::parse(&query.doctor_id, &query.date, &query.time)?;
    let taken = state.appointments.slots().is_slot_taken(&slot).await?;

    Ok(Json(json!({
        "ok": true,
        "taken": taken
    })))
}

#[axum::debug_handler]
pub async fn dismiss_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(body): Json<DismissAppointmentsBody>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin])?;

    if body.appointment_ids.is_empty() {
        return Err(AppError::BadRequest("appointmentIds must not be empty".to_string()));
    }

    let dismissed = state.appointments.dismiss_by_admin(&body.appointment_ids).await?;

    Ok(Json(json!({
        "ok": true,
        "dismissed": dismissed
    })))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

/// Doctors manage their own calendar; admins manage any.
#[axum::debug_handler]
pub async fn set_slot_status(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(body): Json<SlotStatusBody>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Doctor, UserRole::Admin])?;
    if user.role == UserRole::Doctor && body.doctor_id != user.id {
        return Err(AppError::Forbidden("Doctors can only manage their own slots".to_string()));
    }

    let slot = SlotRef::parse(&body.doctor_id, &body.date, &body.time)?;
    let status = SlotStatus::parse(&body.status)?;

    let slots = state.appointments.slots();
    match status {
        SlotStatus::Available => slots.mark_available(&slot).await?,
        SlotStatus::Pending => slots.mark_pending(&slot).await?,
        SlotStatus::Booked => slots.mark_booked(&slot).await?,
    }

    Ok(Json(json!({ "ok": true })))
}

#[axum::debug_handler]
pub async fn get_slot_map(
    State(state): State<Arc<AppointmentCellState>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let slots = state.appointments.slots().slot_map(&doctor_id).await?;

    Ok(Json(json!({
        "ok": true,
        "doctorId": doctor_id,
        "slots": slots
    })))
}
