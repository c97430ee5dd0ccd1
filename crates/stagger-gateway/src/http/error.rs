use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stagger_agent::GenerationError;
use stagger_channels::DeliveryError;
use stagger_scheduler::SchedulerError;
use tracing::warn;

/// Error body shared by every endpoint: `{"error": "...", "code": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Failed to generate email: {0}")]
    Generation(#[from] GenerationError),

    #[error("Failed to send email: {0}")]
    Delivery(#[from] DeliveryError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(e) => match e {
                SchedulerError::InvalidInput(_) | SchedulerError::InvalidCronSchedule { .. } => {
                    StatusCode::BAD_REQUEST
                }
                SchedulerError::JobNotFound { .. } => StatusCode::NOT_FOUND,
                SchedulerError::JobExists { .. } => StatusCode::CONFLICT,
                SchedulerError::GenerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SchedulerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Delivery(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::Scheduler(e) => e.code(),
            ApiError::Generation(_) => "GENERATION_FAILED",
            ApiError::Delivery(_) => "DELIVERY_FAILED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}
