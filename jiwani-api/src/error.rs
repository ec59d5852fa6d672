use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jiwani_core::CoreError;
use jiwani_order::OrderError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service unavailable".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::NotFound(msg) => AppError::NotFoundError(msg),
            CoreError::Conflict(msg) => AppError::ConflictError(msg),
            CoreError::UpstreamError(msg) => AppError::UpstreamError(msg),
            CoreError::IntegrityError(msg) => AppError::InternalServerError(format!("integrity: {}", msg)),
            CoreError::InternalError(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiwani_core::order::OrderStatus;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_core_errors_map_to_http_status() {
        assert_eq!(status_of(CoreError::validation("x").into()), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::not_found("x").into()), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CoreError::conflict("x").into()), StatusCode::CONFLICT);
        assert_eq!(status_of(CoreError::UpstreamError("x".into()).into()), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(CoreError::IntegrityError("x".into()).into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_order_errors_map_through_core() {
        let transition = OrderError::InvalidTransition { from: OrderStatus::Completed, to: OrderStatus::Cancelled };
        assert_eq!(status_of(transition.into()), StatusCode::CONFLICT);
        assert_eq!(status_of(OrderError::EmptyOrder.into()), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(OrderError::NotFound(9).into()), StatusCode::NOT_FOUND);
    }
}
