use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::domain::errors::BillingError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

fn billing_status(err: &BillingError) -> StatusCode {
    match err {
        BillingError::Validation(_) => StatusCode::BAD_REQUEST,
        BillingError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        BillingError::NotFound(_) => StatusCode::NOT_FOUND,
        BillingError::Conflict { .. } => StatusCode::CONFLICT,
        BillingError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        BillingError::ExternalProvider(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Billing(err) => {
                let status = billing_status(err);
                if status.is_server_error() {
                    warn!(kind = err.kind(), error = %err, "http: billing request failed");
                }
                (status, err.to_string())
            }
            AppError::Internal(err) => {
                error!(error = ?err, "http: internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn status_of(err: BillingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn billing_errors_map_to_http_statuses() {
        assert_eq!(status_of(BillingError::Validation("seats".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(BillingError::PermissionDenied {
                user_id: Uuid::new_v4(),
                required: "manage_plan".into(),
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(BillingError::NotFound("subscription".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(BillingError::conflict(None, "add seats", "active", "limit reached")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BillingError::TransientStore("lock timeout".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(BillingError::ExternalProvider("portal down".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn unauthorized_and_internal_errors() {
        assert_eq!(
            AppError::Unauthorized("missing token".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("pool exhausted")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
