use alert_engine::AlertError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Watch(#[from] AlertError),
    #[error("price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Watch(
                AlertError::InvalidRange { .. }
                | AlertError::InvalidSymbol
                | AlertError::InvalidPrice,
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Watch(
                AlertError::SymbolFetchFailed { .. } | AlertError::NotificationFailed { .. },
            )
            | ApiError::PriceUnavailable { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
