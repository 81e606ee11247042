use crate::domain::error::ReconcileError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub struct ApiError(pub ReconcileError);

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            ReconcileError::OrderNotFound(id) => (
                StatusCode::NOT_FOUND,
                "order_not_found",
                format!("order not found: {id}"),
            ),
            ReconcileError::InsufficientCredits {
                available,
                requested,
            } => (
                StatusCode::CONFLICT,
                "insufficient_credits",
                format!("insufficient credits: have {available}, need {requested}"),
            ),
            ReconcileError::InvalidAmount(amount) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_amount",
                format!("invalid credit amount: {amount}"),
            ),
            ReconcileError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            ReconcileError::WebhookAuth(_) => (
                StatusCode::UNAUTHORIZED,
                "webhook_error",
                "invalid webhook token".to_string(),
            ),
            ReconcileError::Oracle(err) => {
                tracing::error!("oracle error: {err}");
                (
                    StatusCode::BAD_GATEWAY,
                    "gateway_error",
                    "payment provider unavailable".to_string(),
                )
            }
            ReconcileError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            ReconcileError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
