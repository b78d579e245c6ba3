//! Quote endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use veil_common::types::QuoteRequest;
use veil_core::quote::RankedRoutes;

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/quote", post(post_quote))
}

/// Rank every viable leg1 × leg2 route for the request.
/// 502 when no provider pair yields a positive payout.
async fn post_quote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<RankedRoutes>, ApiError> {
    let ranked = state.orchestrator.quote(&req).await?;
    Ok(Json(ranked))
}
