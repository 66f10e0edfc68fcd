use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        tracing::error!(error = ?self, "Request failed");

        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, None)
            }
            AppError::Configuration(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::ConfigurationError,
                None,
            ),
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg))
            }
            e @ AppError::SeatsBelowActiveMembers { .. } => error_resp(
                StatusCode::BAD_REQUEST,
                ErrorCode::SeatsBelowActiveMembers,
                Some(e.to_string()),
            ),
            e @ AppError::SeatsOutOfRange { .. } => error_resp(
                StatusCode::BAD_REQUEST,
                ErrorCode::SeatsOutOfRange,
                Some(e.to_string()),
            ),
            AppError::CommitmentNotCompleted {
                commitment_end,
                remaining_months,
            } => {
                let message = AppError::CommitmentNotCompleted {
                    commitment_end,
                    remaining_months,
                }
                .to_string();
                let body = serde_json::json!({
                    "code": ErrorCode::EngagementNotCompleted.as_str(),
                    "message": message,
                    "commitmentEndDate": commitment_end,
                    "remainingMonths": remaining_months,
                });
                (StatusCode::FORBIDDEN, Json(body)).into_response()
            }
            AppError::InvalidSignature(_) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidSignature, None)
            }
            AppError::Unauthorized => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, None)
            }
            AppError::Forbidden => error_resp(StatusCode::FORBIDDEN, ErrorCode::Forbidden, None),
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::Conflict(msg) => {
                error_resp(StatusCode::CONFLICT, ErrorCode::Conflict, Some(msg))
            }
            AppError::PaymentProvider(msg) => error_resp(
                StatusCode::BAD_GATEWAY,
                ErrorCode::PaymentProviderError,
                Some(msg),
            ),
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
