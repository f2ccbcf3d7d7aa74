use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::jobs::JobControlError;

#[derive(Debug, Error)]
pub enum ControlApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Control(#[from] JobControlError),
}

impl ControlApiError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Control(err) => match err {
                JobControlError::UnknownJob(_) => StatusCode::NOT_FOUND,
                JobControlError::InvalidCron(_) => StatusCode::BAD_REQUEST,
                JobControlError::NotSchedulable(_) => StatusCode::CONFLICT,
                JobControlError::ManualExecutionPrevented(_) => StatusCode::PRECONDITION_FAILED,
                JobControlError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ControlApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("❌ Control request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
