use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Missing idToken")]
    MissingToken,

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Identity provider error: {0}")]
    Identity(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Identity(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::MissingToken => AppError::BadRequest(err.to_string()),
            SessionError::InvalidToken(_) => AppError::Auth(err.to_string()),
            SessionError::Identity(msg) => AppError::ExternalService(msg),
            SessionError::Store(store_err) => AppError::Database(store_err.to_string()),
        }
    }
}
