use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::gateway::command::CommandError;

#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "invalid_request",
            AppError::NotFound(_) => "not_found",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Internal(e) => {
                tracing::error!("internal error: {e}");
                "internal server error".to_string()
            }
            AppError::BadRequest(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<CommandError> for AppError {
    fn from(e: CommandError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}
