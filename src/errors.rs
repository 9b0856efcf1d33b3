use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid field geometry: {0}")]
    Geometry(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Unknown district: '{0}'")]
    UnknownDistrict(String),

    #[error("No valid monthly data to predict from: {0}")]
    NoValidData(String),

    #[error("Model artifact error: {0}")]
    ModelArtifact(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Request deadline of {0} seconds exceeded")]
    DeadlineExceeded(u64),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::UnknownDistrict(_) => StatusCode::BAD_REQUEST,
            AppError::Geometry(_) | AppError::EmptyInput(_) | AppError::NoValidData(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ModelArtifact(msg) | AppError::InternalError(msg) => {
                tracing::error!("Internal failure: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            axum::Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::UnknownDistrict("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Geometry("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::EmptyInput("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::NoValidData("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::ExternalServiceError("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::DeadlineExceeded(5), StatusCode::GATEWAY_TIMEOUT),
            (AppError::ModelArtifact("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_unknown_district_message_names_input() {
        let err = AppError::UnknownDistrict("Lahore".into());
        assert_eq!(err.to_string(), "Unknown district: 'Lahore'");
    }
}
