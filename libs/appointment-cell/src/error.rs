use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

use crate::models::AppointmentStatus;

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Appointment {0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Slot {slot_key} with doctor {doctor_id} is already booked")]
    DuplicateBooking { doctor_id: String, slot_key: String },

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Payment for appointment {0} could not be confirmed, please retry")]
    PaymentConsistency(String),

    #[error("Call is not available: {0}")]
    CallNotAvailable(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AppointmentError {
    pub fn duplicate(doctor_id: &str, slot_key: &str) -> Self {
        AppointmentError::DuplicateBooking {
            doctor_id: doctor_id.to_string(),
            slot_key: slot_key.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppointmentError {
    fn from(err: serde_json::Error) -> Self {
        AppointmentError::Store(StoreError::Serialization(err))
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::AuthenticationRequired => AppError::Auth(err.to_string()),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::NotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::DuplicateBooking { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::PaymentConsistency(_) => AppError::Unavailable(err.to_string()),
            AppointmentError::CallNotAvailable(_) => AppError::Conflict(err.to_string()),
            AppointmentError::Store(StoreError::NotFound { .. }) => AppError::NotFound(err.to_string()),
            AppointmentError::Store(store_err) => AppError::Database(store_err.to_string()),
        }
    }
}
