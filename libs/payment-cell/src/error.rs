use thiserror::Error;

use appointment_cell::AppointmentError;
use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider is not configured")]
    NotConfigured,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Payment provider error: {0}")]
    Gateway(String),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Gateway(err.to_string())
    }
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        PaymentError::Appointment(AppointmentError::Store(err))
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured => AppError::Unavailable(err.to_string()),
            PaymentError::Validation(msg) => AppError::ValidationError(msg),
            PaymentError::Forbidden(msg) => AppError::Forbidden(msg),
            PaymentError::Gateway(msg) => AppError::ExternalService(msg),
            PaymentError::Appointment(inner) => inner.into(),
        }
    }
}
