use actix_web::{HttpResponse, ResponseError};
use actix_web::http::StatusCode;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("missing or invalid API key")]
    AuthFailure,
    #[error("rate limit exceeded")]
    RateLimited { retry_after_seconds: u64 },
    #[error("floor not found")]
    FloorNotFound,
    #[error("floor is at capacity")]
    CapacityExceeded,
    #[error("floor has no vehicles to remove")]
    CapacityUnderflow,
    #[error("event conflicts with an existing record")]
    IntegrityConflict,
    #[error("database unavailable")]
    DbUnavailable,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    detail: String,
    status_code: u16,
}

impl AppError {
    fn label(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation Error",
            AppError::AuthFailure => "Authentication Error",
            AppError::RateLimited { .. } => "Too Many Requests",
            AppError::FloorNotFound => "Floor Not Found",
            AppError::CapacityExceeded | AppError::CapacityUnderflow => "Capacity Conflict",
            AppError::IntegrityConflict => "Integrity Conflict",
            AppError::DbUnavailable => "Database Unavailable",
            AppError::Internal(_) => "Internal Server Error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AuthFailure => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::FloorNotFound => StatusCode::BAD_REQUEST,
            AppError::CapacityExceeded | AppError::CapacityUnderflow => StatusCode::CONFLICT,
            AppError::IntegrityConflict => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DbUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);
        if let AppError::RateLimited { retry_after_seconds } = self {
            builder.insert_header(("Retry-After", retry_after_seconds.to_string()));
        }
        builder.json(ErrorResponse {
            success: false,
            error: self.label().to_string(),
            detail: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => AppError::DbUnavailable,
            _ => AppError::Internal(err.to_string()),
        }
    }
}
