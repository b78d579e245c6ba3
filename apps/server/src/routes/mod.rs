//! API route modules and the shared error → HTTP mapping.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};

use veil_common::error::VeilError;

use crate::state::AppState;

pub mod admin;
pub mod diag;
pub mod quote;
pub mod swap;

/// Build the full `/api` router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(quote::router())
        .merge(swap::router())
        .merge(admin::router())
        .merge(diag::router())
}

/// Engine errors rendered as JSON with the right status code.
pub struct ApiError(pub VeilError);

impl From<VeilError> for ApiError {
    fn from(e: VeilError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VeilError::Validation(_) => StatusCode::BAD_REQUEST,
            VeilError::UnknownSwap(_) => StatusCode::NOT_FOUND,
            VeilError::NoQuote
            | VeilError::ProviderCreateFailed { .. }
            | VeilError::Provider { .. }
            | VeilError::Network(_)
            | VeilError::WalletRpc(_)
            | VeilError::WalletSend(_) => StatusCode::BAD_GATEWAY,
            VeilError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
