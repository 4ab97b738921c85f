use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Request-level failures mapped onto HTTP statuses.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Validation(#[from] putscan_core::ValidationError),

    #[error(transparent)]
    Csv(#[from] crate::csv::RenderError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
